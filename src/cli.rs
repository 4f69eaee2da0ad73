//! Command line interface definition

use crate::config::ShieldConfig;
use clap::Parser;

/// Probe candidate domains from every configured source and report the
/// fastest reachable endpoint.
#[derive(Parser, Debug, Clone)]
#[command(name = "cshield", version, about)]
pub struct Cli {
    /// Application key for the local proxy bridge
    #[arg(long, env = "SHIELD_APP_KEY")]
    pub app_key: String,

    /// Deployment/site code
    #[arg(long, env = "SHIELD_SITE_CODE")]
    pub site_code: String,

    /// Package identifier attached to speed-test requests
    #[arg(long, env = "SHIELD_PACKAGE_NAME")]
    pub package_name: String,

    /// Static list provider URL (GET, JSON array of URL strings)
    #[arg(long, env = "SHIELD_STATIC_LIST_URL")]
    pub static_list_url: String,

    /// Site-query provider URL (POST {"site": ..})
    #[arg(long, env = "SHIELD_SITE_QUERY_URL")]
    pub site_query_url: String,

    /// Fallback domain, repeatable
    #[arg(long = "default-domain", required = true)]
    pub default_domains: Vec<String>,

    /// Speed-test path appended to each candidate
    #[arg(long, default_value = "api/v1/speed")]
    pub speed_test_path: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Local proxy endpoint as ip:port; omit if no proxy daemon runs
    #[arg(long)]
    pub local_endpoint: Option<String>,

    /// Domain store file path (defaults to the XDG cache location)
    #[arg(long)]
    pub store_path: Option<std::path::PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Print the loaded configuration before running
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Build the engine configuration from the parsed arguments
    pub fn to_config(&self) -> ShieldConfig {
        ShieldConfig {
            app_key: self.app_key.clone(),
            site_code: self.site_code.clone(),
            package_name: self.package_name.clone(),
            speed_test_path: self.speed_test_path.clone(),
            static_list_url: self.static_list_url.clone(),
            site_query_url: self.site_query_url.clone(),
            default_domains: self.default_domains.clone(),
            timeout_seconds: self.timeout,
            site_query_timeout_seconds: crate::defaults::SITE_QUERY_TIMEOUT.as_secs(),
        }
    }
}
