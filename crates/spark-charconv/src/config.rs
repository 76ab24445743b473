//! 转换器配置：包装器使用的会话编码组合与尺寸档位表。
//!
//! # 模块定位（Why）
//! - 档位常量与会话组合抽成可反序列化的配置后，
//!   “选择不小于需求的最小档位”策略可以脱离具体常量独立测试；
//! - 宿主通过 TOML 注入配置，缺省值即标准三档与 `ISO-8859-1 → UTF-8` 会话组合。
//!
//! # 示例（Examples）
//! ```rust
//! use spark_charconv::CharConverterConfig;
//!
//! let config = CharConverterConfig::from_toml_str(
//!     r#"
//!     [session]
//!     from = "ISO-8859-1"
//!     to = "UTF-16"
//!
//!     [[size_classes]]
//!     label = "tiny"
//!     capacity = 0x40
//!
//!     [[size_classes]]
//!     label = "huge"
//!     capacity = 0x400
//!     "#,
//! )
//! .expect("配置应当合法");
//! assert_eq!(config.session().to, "UTF-16");
//! assert_eq!(config.size_classes().len(), 2);
//! ```

use std::borrow::Cow;

use serde::Deserialize;
use thiserror::Error;

use crate::{
    encoding::{ISO_8859_1, UTF_8},
    memory::{ChunkSizeClass, SizeClass, SizeClassTable},
};

/// 配置加载与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 解析失败。
    #[error("failed to parse converter configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值违反约束。
    #[error("invalid converter configuration: {0}")]
    Invalid(Cow<'static, str>),
}

/// 包装器打开描述符时使用的编码组合。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionPair {
    /// 源编码名。
    pub from: String,
    /// 目标编码名。
    pub to: String,
}

impl SessionPair {
    /// 创建组合。
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Default for SessionPair {
    /// 缺省组合固定为 `ISO-8859-1 → UTF-8`，三个包装器都走这一组合，与包装器名称无关。
    fn default() -> Self {
        Self::new(ISO_8859_1, UTF_8)
    }
}

/// 单个尺寸档位的配置项。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SizeClassConfig {
    /// 档位标签。
    pub label: String,
    /// 固定容量（字节）。
    pub capacity: usize,
}

/// 转换器配置根。
///
/// # 契约说明（What）
/// - 缺省值：会话组合 `ISO-8859-1 → UTF-8`，档位 small/medium/large = 0x80/0x100/0x200；
/// - 校验：会话名称非空且不含 NUL；档位至少一个、容量非零且严格递增。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CharConverterConfig {
    #[serde(default)]
    session: SessionPair,
    #[serde(default = "standard_size_classes")]
    size_classes: Vec<SizeClassConfig>,
}

impl Default for CharConverterConfig {
    fn default() -> Self {
        Self {
            session: SessionPair::default(),
            size_classes: standard_size_classes(),
        }
    }
}

impl CharConverterConfig {
    /// 从 TOML 文本加载并校验。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// 替换会话组合。
    pub fn with_session(mut self, session: SessionPair) -> Self {
        self.session = session;
        self
    }

    /// 替换档位列表。
    pub fn with_size_classes(mut self, size_classes: Vec<SizeClassConfig>) -> Self {
        self.size_classes = size_classes;
        self
    }

    /// 会话组合。
    pub fn session(&self) -> &SessionPair {
        &self.session
    }

    /// 档位配置。
    pub fn size_classes(&self) -> &[SizeClassConfig] {
        &self.size_classes
    }

    /// 校验全部字段。
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, name) in [("from", &self.session.from), ("to", &self.session.to)] {
            if name.is_empty() || name.contains('\0') {
                return Err(ConfigError::Invalid(Cow::Owned(format!(
                    "session.{field} must be a non-empty name without NUL"
                ))));
            }
        }
        self.size_class_table().map(|_| ())
    }

    /// 构建档位表。
    pub fn size_class_table(&self) -> Result<SizeClassTable, ConfigError> {
        let classes = self
            .size_classes
            .iter()
            .map(|class| SizeClass::new(class.label.clone(), class.capacity))
            .collect();
        SizeClassTable::new(classes).map_err(|err| ConfigError::Invalid(Cow::Owned(err.to_string())))
    }
}

fn standard_size_classes() -> Vec<SizeClassConfig> {
    ChunkSizeClass::ALL
        .into_iter()
        .map(|class| SizeClassConfig {
            label: class.label().to_owned(),
            capacity: class.capacity(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CharConverterConfig::from_toml_str("").expect("空文档应使用缺省值");
        assert_eq!(config, CharConverterConfig::default());
        assert_eq!(config.session(), &SessionPair::new("ISO-8859-1", "UTF-8"));
        assert_eq!(
            config.size_class_table().expect("缺省档位合法"),
            SizeClassTable::standard()
        );
    }

    #[test]
    fn descending_classes_are_invalid() {
        let err = CharConverterConfig::from_toml_str(
            r#"
            [[size_classes]]
            label = "big"
            capacity = 0x200

            [[size_classes]]
            label = "small"
            capacity = 0x80
            "#,
        )
        .expect_err("降序档位应被拒绝");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = CharConverterConfig::from_toml_str("retries = 3").expect_err("未知字段应报错");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn empty_session_name_is_invalid() {
        let config = CharConverterConfig::default().with_session(SessionPair::new("", "UTF-8"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
