use crate::error::ConfigError;
use crate::pipeline::TransformerKind;
use crate::pipeline::filter::FilterAction;
use chatr_text::TextColor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use toml_edit::{Array, DocumentMut, value};

trait ConfigSerializeDefault {
    fn fix_config(self, name: &str, doc: &mut DocumentMut);
}

macro_rules! impl_simple_default {
    ( $( $type:ty ),* ) => {
        $(
            impl ConfigSerializeDefault for $type {
                fn fix_config(self, name: &str, doc: &mut DocumentMut) {
                    doc.entry(name).or_insert_with(|| value(self));
                }
            }
        )*
    }
}

impl_simple_default!(String, i64, bool);

impl ConfigSerializeDefault for Vec<String> {
    fn fix_config(self, name: &str, doc: &mut DocumentMut) {
        doc.entry(name)
            .or_insert_with(|| value(self.into_iter().collect::<Array>()));
    }
}

impl<T> ConfigSerializeDefault for Option<T> {
    fn fix_config(self, _: &str, _: &mut DocumentMut) {
        debug_assert!(self.is_none(), "`Some` as default is unimplemented");
    }
}

macro_rules! gen_config {
    (
        $( $name:ident: $type:ty = $default:expr),*
    ) => {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct ChatConfig {
            $(
                pub $name: $type,
            )*
        }

        impl Default for ChatConfig {
            fn default() -> ChatConfig {
                ChatConfig {
                    $(
                        $name: $default,
                    )*
                }
            }
        }

        impl ChatConfig {
            /// Fills in every missing key with its default.
            fn patch(doc: &mut DocumentMut) {
                $(
                    <$type as ConfigSerializeDefault>::fix_config($default, stringify!($name), doc);
                )*
            }
        }
    };
}

gen_config! {
    transformer_order: Vec<String> = ["placeholder", "mention", "style", "filter"]
        .map(String::from)
        .to_vec(),
    filter_wordlist: Vec<String> = Vec::new(),
    filter_action: String = "drop".to_string(),
    cache_ttl_ms: i64 = 5000,
    max_rendered_length: i64 = 256,
    render_threads: i64 = 2,
    mention_color: String = "yellow".to_string(),
    link_urls: bool = true,
    color_permission: String = "chatr.chat.color".to_string(),
    rate_limit_messages: i64 = 10,
    rate_limit_window_ms: i64 = 60_000,
    rate_limit_cooldown_ms: i64 = 0,
    placeholders: Option<BTreeMap<String, String>> = None
}

impl ChatConfig {
    /// Loads the config at `path`, writing back any keys that were missing.
    /// A missing file is created with every default.
    pub fn load(path: impl AsRef<Path>) -> Result<ChatConfig, ConfigError> {
        let path = path.as_ref();
        let str = match fs::read_to_string(path) {
            Ok(str) => str,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        let mut doc = str.parse::<DocumentMut>()?;
        Self::patch(&mut doc);

        let patched = doc.to_string();
        if str != patched {
            fs::write(path, &patched)?;
        }

        let config: ChatConfig = toml::from_str(&patched)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a config without touching the filesystem.
    pub fn from_toml(str: &str) -> Result<ChatConfig, ConfigError> {
        let mut doc = str.parse::<DocumentMut>()?;
        Self::patch(&mut doc);
        let config: ChatConfig = toml::from_str(&doc.to_string())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transformers()?;
        self.filter_action()?;
        self.mention_color()?;
        if self.cache_ttl_ms <= 0 {
            return Err(ConfigError::invalid("cache_ttl_ms", "must be positive"));
        }
        if self.max_rendered_length <= 0 {
            return Err(ConfigError::invalid("max_rendered_length", "must be positive"));
        }
        if self.render_threads <= 0 {
            return Err(ConfigError::invalid("render_threads", "must be at least 1"));
        }
        if self.rate_limit_messages <= 0 || self.rate_limit_window_ms <= 0 {
            return Err(ConfigError::invalid(
                "rate_limit_messages",
                "rate limit and window must be positive",
            ));
        }
        if self.rate_limit_cooldown_ms < 0 {
            return Err(ConfigError::invalid("rate_limit_cooldown_ms", "must not be negative"));
        }
        Ok(())
    }

    /// Enabled transformers in the order they run.
    pub fn transformers(&self) -> Result<Vec<TransformerKind>, ConfigError> {
        let mut kinds = self
            .transformer_order
            .iter()
            .map(|name| {
                name.parse::<TransformerKind>()
                    .map_err(|_| ConfigError::invalid("transformer_order", format!("unknown transformer `{name}`")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        kinds.sort();
        kinds.dedup();
        Ok(kinds)
    }

    pub fn filter_action(&self) -> Result<FilterAction, ConfigError> {
        self.filter_action
            .parse()
            .map_err(|_| ConfigError::invalid("filter_action", "expected `drop` or `censor`"))
    }

    pub fn mention_color(&self) -> Result<TextColor, ConfigError> {
        TextColor::parse(&self.mention_color).ok_or_else(|| {
            ConfigError::invalid("mention_color", format!("unknown color `{}`", self.mention_color))
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms.max(1) as u64)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms.max(1) as u64)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ChatConfig::from_toml("").unwrap();
        assert_eq!(
            config.transformers().unwrap(),
            vec![
                TransformerKind::Placeholder,
                TransformerKind::Mention,
                TransformerKind::Style,
                TransformerKind::Filter,
            ]
        );
        assert_eq!(config.filter_action().unwrap(), FilterAction::Drop);
        assert_eq!(config.cache_ttl(), Duration::from_secs(5));
        assert_eq!(config.max_rendered_length, 256);
        assert!(config.placeholders.is_none());
    }

    #[test]
    fn order_is_canonical() {
        let config =
            ChatConfig::from_toml(r#"transformer_order = ["filter", "style", "rate_limit", "style"]"#)
                .unwrap();
        assert_eq!(
            config.transformers().unwrap(),
            vec![TransformerKind::RateLimit, TransformerKind::Style, TransformerKind::Filter]
        );
    }

    #[test]
    fn unknown_transformer_is_rejected() {
        let err = ChatConfig::from_toml(r#"transformer_order = ["emoji"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "transformer_order", .. }));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(ChatConfig::from_toml(r#"filter_action = "mute""#).is_err());
        assert!(ChatConfig::from_toml(r#"mention_color = "octarine""#).is_err());
        assert!(ChatConfig::from_toml("render_threads = 0").is_err());
        assert!(ChatConfig::from_toml("cache_ttl_ms = [").is_err());
    }

    #[test]
    fn static_placeholders() {
        let config = ChatConfig::from_toml("[placeholders]\nserver = \"Lobby\"\n").unwrap();
        assert_eq!(
            config.placeholders.unwrap().get("server").map(String::as_str),
            Some("Lobby")
        );
    }

    #[test]
    fn load_writes_missing_keys() {
        let path = std::env::temp_dir().join(format!("chatr-config-{}.toml", std::process::id()));
        fs::write(&path, "cache_ttl_ms = 100\n").unwrap();
        let config = ChatConfig::load(&path).unwrap();
        assert_eq!(config.cache_ttl_ms, 100);
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("cache_ttl_ms = 100"));
        assert!(written.contains("filter_action = \"drop\""));
        fs::remove_file(&path).unwrap();
    }
}
