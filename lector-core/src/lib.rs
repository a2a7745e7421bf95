//! # lector-core — Anotação de Textos com Vocabulário do Aprendiz
//!
//! Este crate transforma o texto bruto de um documento (markdown simples, com marcadores de
//! página) numa sequência ordenada de sentenças anotadas: cada palavra (ou expressão de várias
//! palavras) vem com o que o aprendiz já sabe dela: status, tradução, pronúncia e imagem.
//!
//! ## Arquitetura do Sistema
//!
//! 1.  **Entrada**: texto bruto + id do idioma.
//! 2.  **Segmentação** ([`segmenter`]): markdown → [`Segment`]s (texto, imagem, quebras, blocos, páginas).
//! 3.  **Tokenização** ([`tokenizer`]): cada parágrafo vira sentenças de [`Token`]s, por um
//!     adaptador escolhido pelo nome no [`TokenizerRegistry`].
//! 4.  **Índice de palavras** ([`word_index`]): vocabulário do idioma agrupado pela primeira
//!     palavra, mantido em cache por idioma.
//! 5.  **Casamento** ([`matcher`]): varredura gulosa da esquerda para a direita; a expressão mais
//!     frequente que casa vence.
//! 6.  **Saída**: lista de [`ParsedTextUnit`] na ordem do documento.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use std::sync::Arc;
//! use lector_core::{
//!     Annotator, Language, MemoryStore, NewVocabularyEntry, ParsedTextUnit, TokenizerRegistry,
//!     VocabularyService, WordIndexCache,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let index = Arc::new(WordIndexCache::new(store.clone()));
//! let service = VocabularyService::new(store.clone(), index.clone());
//! service.create(NewVocabularyEntry::new(1, "have to", &["have", "to"], 2)).unwrap();
//!
//! let annotator = Annotator::new(Arc::new(TokenizerRegistry::with_builtin()), index);
//! annotator
//!     .register_language(Language { id: 1, name: "English".into(), parser_name: "english".into(), rtl: false })
//!     .unwrap();
//!
//! let units = annotator.annotate("I have to go.", 1).unwrap();
//! if let ParsedTextUnit::Sentence(sentence) = &units[0] {
//!     assert_eq!(sentence.words[1].surface, "have to");
//! }
//! ```
//!
//! ## Módulos Principais
//!
//! - [`pipeline`]: orquestrador que conecta todos os estágios.
//! - [`service`]: escritas no vocabulário que mantêm o cache coerente.
//! - [`vocabulary`]: modelo de dados e contrato do armazenamento.
//! - [`error`]: erros do crate.

pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod segmenter;
pub mod service;
pub mod tokenizer;
pub mod vocabulary;
pub mod word_index;

pub use error::{LectorError, Result, StoreError};
pub use matcher::{match_sentence, AnnotatedWord};
pub use pipeline::{Annotator, AnnotatorConfig, Language, ParsedTextUnit, SentenceResult};
pub use segmenter::{segment, Segment};
pub use service::VocabularyService;
pub use tokenizer::{Token, TokenizerAdapter, TokenizerRegistry};
pub use vocabulary::{
    EntryId, LanguageId, MemoryStore, NewVocabularyEntry, VocabularyEntry, VocabularyStore, VocabularyWriter,
};
pub use word_index::{WordIndex, WordIndexCache};
