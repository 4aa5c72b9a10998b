//! Names, paths and well-known values shared across the bootstrap pipeline.

/// Environment variable naming the deployment directory.
pub const HOMELAB_DIR_ENV: &str = "HOMELAB_DIR";

/// Environment variable carrying a non-interactive Tailscale auth key.
pub const AUTH_KEY_ENV: &str = "TAILSCALE_AUTH_KEY";

/// Directory name under `$HOME` used when `HOMELAB_DIR` is unset.
pub const DEFAULT_DIR_NAME: &str = "homelab";

pub const ENV_FILE_NAME: &str = ".env";

/// Certificates live in `<HOMELAB_DIR>/config/certs/`.
pub const CERTS_SUBDIR: [&str; 2] = ["config", "certs"];

/// Compose descriptors, in lookup order. The first one present wins.
pub const COMPOSE_DESCRIPTORS: [&str; 4] = ["docker-compose.yml", "docker-compose.yaml", "compose.yml", "compose.yaml"];

/// Packages the pipeline needs before touching Docker or Tailscale.
pub const BASE_PACKAGES: [&str; 3] = ["curl", "ca-certificates", "jq"];

pub const DOCKER_BIN: &str = "docker";
pub const DOCKER_SERVICE: &str = "docker";
pub const DOCKER_GROUP: &str = "docker";
pub const COMPOSE_PLUGIN_PACKAGE: &str = "docker-compose-plugin";
pub const DOCKER_INSTALL_SCRIPT: &str = "curl -fsSL https://get.docker.com | sh";

pub const TAILSCALE_BIN: &str = "tailscale";
pub const TAILSCALE_SERVICE: &str = "tailscaled";
pub const TAILSCALE_INSTALL_SCRIPT: &str = "curl -fsSL https://tailscale.com/install.sh | sh";

pub const SUDO_BIN: &str = "sudo";
pub const SYSTEMCTL_BIN: &str = "systemctl";

/// `.env` keys consumed by the deployment stack.
pub const TS_IP_KEY: &str = "TS_IP";
pub const TS_FQDN_KEY: &str = "TS_FQDN";
