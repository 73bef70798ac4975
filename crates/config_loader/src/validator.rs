//! 配置校验模块
//!
//! 校验规则：
//! - producer 字段范围 (validator derive) 与跨字段约束
//! - transport 名称非空
//! - file transport 的 base_path 非空

use contracts::{ContractError, ShipperConfig, TransportConfig, TransportKind};

/// 校验 ShipperConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ShipperConfig) -> Result<(), ContractError> {
    config.producer.check()?;
    validate_transport(&config.transport)?;
    Ok(())
}

/// 校验 transport 配置
fn validate_transport(transport: &TransportConfig) -> Result<(), ContractError> {
    if transport.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "transport.name",
            "transport name cannot be empty",
        ));
    }

    if transport.kind == TransportKind::File {
        if let Some(base_path) = transport.params.get("base_path") {
            if base_path.trim().is_empty() {
                return Err(ContractError::config_validation(
                    format!("transport[{}].params.base_path", transport.name),
                    "base_path cannot be empty",
                ));
            }
        }
    }

    Ok(())
}
