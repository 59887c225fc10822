//! SSM操作モジュール
//!
//! SSM Parameter Storeから設定値を取得する`ParameterSource`実装を提供する。

use async_trait::async_trait;
use aws_sdk_ssm::Client as SsmClient;
use tracing::{debug, warn};

use super::config::{ConfigError, ConfigKey, ParameterSource};

/// SSM Parameter Storeを使用したパラメータソース
pub struct SsmParameterSource {
    client: SsmClient,
}

impl SsmParameterSource {
    /// 新しいSsmParameterSourceを作成
    pub fn new(client: SsmClient) -> Self {
        Self { client }
    }

    /// AWS設定からクライアントを作成
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(SsmClient::new(config))
    }
}

#[async_trait]
impl ParameterSource for SsmParameterSource {
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
        let result = self
            .client
            .get_parameter()
            .name(key.parameter)
            .with_decryption(false)
            .send()
            .await;

        match result {
            Ok(output) => {
                let value = output
                    .parameter()
                    .and_then(|p| p.value())
                    .map(|v| v.to_string())
                    .filter(|v| !v.is_empty());
                debug!(parameter = key.parameter, found = value.is_some(), "SSMパラメータ取得");
                Ok(value)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_parameter_not_found() {
                    debug!(parameter = key.parameter, "SSMパラメータが存在しない");
                    return Ok(None);
                }
                warn!(parameter = key.parameter, error = %service_err, "SSMパラメータ取得エラー");
                Err(ConfigError::Parameter(format!(
                    "{}: {}",
                    key.parameter, service_err
                )))
            }
        }
    }
}
