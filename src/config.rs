use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub app_name: String,
    pub relation_name: String,
    /// Only the leader unit publishes application relation data.
    pub leader: bool,
    /// Address the CU should use to reach this DU over F1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub du_address: Option<String>,
    pub f1_du_port: String,
    pub container_name: String,
    /// Host directory bind-mounted at `/opt/oai-gnb/etc` in the container.
    pub config_dir: PathBuf,
    pub mcc: String,
    pub mnc: String,
    pub mnc_length: u8,
    pub nssai_sst: u8,
    pub nssai_sd: String,
    pub restart_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "du".into(),
            relation_name: "fiveg-f1".into(),
            leader: true,
            du_address: None,
            f1_du_port: "2153".into(),
            container_name: "du".into(),
            config_dir: PathBuf::from("/var/lib/du-operator/etc"),
            mcc: "208".into(),
            mnc: "99".into(),
            mnc_length: 2,
            nssai_sst: 1,
            nssai_sd: "0x000001".into(),
            restart_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("du-operator.toml"))
                .merge(Json::file("du-operator.json"))
                .merge(Env::prefixed("DU_OPERATOR_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        if let Ok(address_file) = std::env::var("DU_OPERATOR_DU_ADDRESS_FILE") {
            config.du_address = Some(std::fs::read_to_string(address_file)?.trim().to_string());
        }

        if config.mnc_length != 2 && config.mnc_length != 3 {
            anyhow::bail!("Invalid mnc_length {}: must be 2 or 3", config.mnc_length);
        }

        Ok(config)
    }
}
