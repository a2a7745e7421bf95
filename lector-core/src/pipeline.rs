//! # Pipeline de Anotação — Orquestrador
//!
//! O [`Annotator`] conecta todos os estágios:
//!
//! 1. **Segmentação** ([`segmenter`](crate::segmenter)): texto bruto → segmentos tipados.
//! 2. **Resolução do idioma**: tokenizer (pelo nome) e índice de palavras (pelo id).
//! 3. **Tokenização**: cada [`Segment::RawTextParagraph`] vira uma lista de sentenças.
//! 4. **Casamento** ([`matcher`](crate::matcher)): cada sentença vira uma lista de [`AnnotatedWord`].
//! 5. **Montagem**: a saída segue exatamente a ordem dos segmentos; parágrafos de texto são
//!    expandidos em uma [`SentenceResult`] por sentença e o resto passa intacto.
//!
//! `paragraph_order` começa em 1 e soma um a cada parágrafo de texto; `sentence_order` vai de
//! 1 a N dentro do parágrafo. Segmentos que não são texto não contam.
//!
//! Os parágrafos são independentes entre si, então tokenização e casamento rodam em paralelo
//! (`rayon`) quando [`AnnotatorConfig::parallel`] está ligado; a ordem da saída não muda.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{LectorError, Result};
use crate::matcher::{loop_guard, match_sentence_bounded, AnnotatedWord, DEFAULT_LOOP_GUARD_FACTOR};
use crate::segmenter::{segment, Segment};
use crate::tokenizer::{TokenizerAdapter, TokenizerRegistry};
use crate::vocabulary::LanguageId;
use crate::word_index::{WordIndex, WordIndexCache};

/// Ajustes do orquestrador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Limite de iterações do casador por sentença = `fator × tokens + 1`.
    pub loop_guard_factor: usize,
    /// Processa parágrafos em paralelo.
    pub parallel: bool,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            loop_guard_factor: DEFAULT_LOOP_GUARD_FACTOR,
            parallel: true,
        }
    }
}

/// Idioma cadastrado: liga o id do armazenamento ao nome do tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: LanguageId,
    pub name: String,
    /// Nome do tokenizer no [`TokenizerRegistry`].
    pub parser_name: String,
    /// Escrita da direita para a esquerda.
    #[serde(default)]
    pub rtl: bool,
}

/// Uma sentença anotada e sua posição no documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceResult {
    pub words: Vec<AnnotatedWord>,
    pub paragraph_order: usize,
    pub sentence_order: usize,
}

/// Unidade final entregue à camada de apresentação.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ParsedTextUnit {
    /// Segmento que não é texto (imagem, quebra, bloco, página), repassado sem mudança.
    Segment(Segment),
    Sentence(SentenceResult),
}

/// Trabalho intermediário: texto já numerado ou segmento de passagem.
enum Pending {
    Passthrough(Segment),
    Paragraph { order: usize, text: String },
}

/// Orquestrador do pipeline de anotação.
///
/// Recebe por injeção o registro de tokenizers e o cache de índices; não há estado global.
/// Todos os métodos usam `&self`, então uma instância pode ser compartilhada entre threads.
pub struct Annotator {
    registry: Arc<TokenizerRegistry>,
    word_index: Arc<WordIndexCache>,
    languages: RwLock<HashMap<LanguageId, Language>>,
    config: AnnotatorConfig,
}

impl Annotator {
    pub fn new(registry: Arc<TokenizerRegistry>, word_index: Arc<WordIndexCache>) -> Self {
        Self {
            registry,
            word_index,
            languages: RwLock::new(HashMap::new()),
            config: AnnotatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnnotatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &TokenizerRegistry {
        &self.registry
    }

    pub fn word_index(&self) -> &WordIndexCache {
        &self.word_index
    }

    /// Cadastra (ou substitui) um idioma. O tokenizer precisa existir no registro.
    pub fn register_language(&self, language: Language) -> Result<()> {
        if !self.registry.contains(&language.parser_name) {
            return Err(LectorError::UnsupportedLanguage(language.parser_name));
        }
        tracing::info!(language_id = language.id, name = %language.name, parser = %language.parser_name, "idioma cadastrado");
        self.languages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(language.id, language);
        Ok(())
    }

    pub fn language(&self, language_id: LanguageId) -> Option<Language> {
        self.languages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&language_id)
            .cloned()
    }

    /// Idiomas cadastrados, ordenados por id.
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self
            .languages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        languages.sort_by_key(|l| l.id);
        languages
    }

    /// Anota o texto bruto de um documento no idioma `language_id`.
    ///
    /// Ou devolve a lista completa, ou o primeiro erro encontrado; nunca um resultado parcial.
    pub fn annotate(&self, raw_text: &str, language_id: LanguageId) -> Result<Vec<ParsedTextUnit>> {
        let start = Instant::now();
        let segments = segment(raw_text)?;

        let language = self
            .language(language_id)
            .ok_or(LectorError::UnknownLanguageId(language_id))?;
        let tokenizer = self.registry.get(&language.parser_name)?;
        let index = self.word_index.get_or_build(language_id)?;

        let units = self.annotate_segments(segments, tokenizer.as_ref(), &index)?;
        tracing::debug!(
            language_id,
            chars = raw_text.len(),
            units = units.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "documento anotado"
        );
        Ok(units)
    }

    /// Anota segmentos já produzidos, com tokenizer e índice já resolvidos.
    pub fn annotate_segments(
        &self,
        segments: Vec<Segment>,
        tokenizer: &dyn TokenizerAdapter,
        index: &WordIndex,
    ) -> Result<Vec<ParsedTextUnit>> {
        let mut paragraph_order = 0;
        let pending: Vec<Pending> = segments
            .into_iter()
            .map(|segment| match segment {
                Segment::RawTextParagraph(text) => {
                    paragraph_order += 1;
                    Pending::Paragraph {
                        order: paragraph_order,
                        text,
                    }
                }
                other => Pending::Passthrough(other),
            })
            .collect();

        let expand = |item: Pending| -> Result<Vec<ParsedTextUnit>> {
            match item {
                Pending::Passthrough(segment) => Ok(vec![ParsedTextUnit::Segment(segment)]),
                Pending::Paragraph { order, text } => self.annotate_paragraph(&text, order, tokenizer, index),
            }
        };

        let expanded: Vec<Vec<ParsedTextUnit>> = if self.config.parallel {
            pending.into_par_iter().map(expand).collect::<Result<_>>()?
        } else {
            pending.into_iter().map(expand).collect::<Result<_>>()?
        };
        Ok(expanded.into_iter().flatten().collect())
    }

    /// Tokeniza um parágrafo e casa cada sentença, numerando-as a partir de 1.
    fn annotate_paragraph(
        &self,
        text: &str,
        paragraph_order: usize,
        tokenizer: &dyn TokenizerAdapter,
        index: &WordIndex,
    ) -> Result<Vec<ParsedTextUnit>> {
        let sentences = tokenizer.split_into_sentences_and_tokens(text)?;
        sentences
            .iter()
            .enumerate()
            .map(|(i, tokens)| {
                let guard = loop_guard(tokens.len(), self.config.loop_guard_factor);
                let words = match_sentence_bounded(tokens, index, guard)?;
                Ok(ParsedTextUnit::Sentence(SentenceResult {
                    words,
                    paragraph_order,
                    sentence_order: i + 1,
                }))
            })
            .collect()
    }
}
