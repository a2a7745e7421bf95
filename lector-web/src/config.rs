//! Configuração do servidor, lida de variáveis de ambiente.
//!
//! | Variável            | Padrão          | Uso                                        |
//! |---------------------|-----------------|--------------------------------------------|
//! | `LECTOR_BIND`       | `0.0.0.0:3000`  | endereço do listener                       |
//! | `LECTOR_VOCABULARY` | (nenhum)        | JSON com as entradas iniciais do vocabulário |
//! | `LECTOR_SEQUENTIAL` | `false`         | desliga o paralelismo entre parágrafos     |
//! | `RUST_LOG`          | `info`          | filtro do `tracing-subscriber`             |

use std::path::PathBuf;

use lector_core::{AnnotatorConfig, Language};

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind: String,
    pub vocabulary_path: Option<PathBuf>,
    pub annotator: AnnotatorConfig,
    pub languages: Vec<Language>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            vocabulary_path: None,
            annotator: AnnotatorConfig::default(),
            languages: default_languages(),
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Monta a configuração a partir de uma função de consulta (testável sem tocar no ambiente).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(bind) = lookup("LECTOR_BIND").filter(|v| !v.trim().is_empty()) {
            config.bind = bind;
        }
        config.vocabulary_path = lookup("LECTOR_VOCABULARY")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        if let Some(sequential) = lookup("LECTOR_SEQUENTIAL") {
            config.annotator.parallel = !matches!(sequential.trim(), "1" | "true" | "yes");
        }
        config
    }
}

/// Idiomas disponíveis ao subir o servidor, um por tokenizer embutido.
pub fn default_languages() -> Vec<Language> {
    [(1, "English", "english"), (2, "Japanese", "japanese"), (3, "Chinese", "chinese")]
        .into_iter()
        .map(|(id, name, parser)| Language {
            id,
            name: name.to_string(),
            parser_name: parser.to_string(),
            rtl: false,
        })
        .collect()
}
