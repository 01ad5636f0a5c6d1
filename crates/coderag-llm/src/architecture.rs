use serde::{Deserialize, Serialize};

/// Encoder family of a sentence-embedding checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedArchitecture {
    /// Decide from the model's `config.json`.
    #[default]
    Auto,
    Bert,
    JinaBert,
}

impl EmbedArchitecture {
    /// `JinaBERT` checkpoints declare custom modelling code (`auto_map`) and ALiBi
    /// positions; anything else is treated as plain BERT.
    #[must_use]
    pub fn detect(config: &serde_json::Value) -> Self {
        let alibi = config
            .get("position_embedding_type")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|t| t.eq_ignore_ascii_case("alibi"));
        if alibi || config.get("auto_map").is_some() {
            Self::JinaBert
        } else {
            Self::Bert
        }
    }

    /// Whether loading needs `trust_remote_code`.
    #[must_use]
    pub fn requires_remote_code(self) -> bool {
        matches!(self, Self::JinaBert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_jina_from_alibi() {
        let cfg = serde_json::json!({"position_embedding_type": "alibi", "hidden_size": 768});
        assert_eq!(EmbedArchitecture::detect(&cfg), EmbedArchitecture::JinaBert);
    }

    #[test]
    fn detects_jina_from_auto_map() {
        let cfg = serde_json::json!({"auto_map": {"AutoModel": "jinaai/jina-bert-implementation"}});
        assert_eq!(EmbedArchitecture::detect(&cfg), EmbedArchitecture::JinaBert);
    }

    #[test]
    fn plain_bert_detected() {
        let cfg = serde_json::json!({"position_embedding_type": "absolute"});
        assert_eq!(EmbedArchitecture::detect(&cfg), EmbedArchitecture::Bert);
    }

    #[test]
    fn architecture_deserializes_kebab_case() {
        let a: EmbedArchitecture = serde_json::from_str("\"jina-bert\"").unwrap();
        assert_eq!(a, EmbedArchitecture::JinaBert);
    }
}
