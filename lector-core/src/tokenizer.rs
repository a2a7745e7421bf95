//! # Tokenizadores por Idioma
//!
//! Divide o texto de um parágrafo em sentenças e cada sentença em tokens. O resto do
//! pipeline só enxerga a capacidade [`TokenizerAdapter`]; a implementação concreta é
//! escolhida pelo **nome** do tokenizer através do [`TokenizerRegistry`].
//!
//! ## Tokenizadores embutidos
//!
//! - **english** ([`EnglishTokenizer`]): segmentação Unicode UAX #29 de sentenças e palavras.
//!   Serve para idiomas que separam palavras por espaço.
//! - **japanese** / **chinese** ([`CjkTokenizer`]): agrupa sequências de mesma escrita
//!   (kanji/hanzi, hiragana, katakana, latim) e corta sentenças em `。！？!?` ou quebra de linha,
//!   sem depender de espaço após a pontuação.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use lector_core::tokenizer::TokenizerRegistry;
//!
//! let registry = TokenizerRegistry::with_builtin();
//! let english = registry.get("english").unwrap();
//! let sentences = english.split_into_sentences_and_tokens("I am good. You too.").unwrap();
//! assert_eq!(sentences.len(), 2);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{LectorError, Result};

/// Um token produzido por um tokenizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// Texto exato do token (ex: "have", ".").
    pub surface: String,
    pub lemma: String,
    /// Classe gramatical no formato do tokenizer (ex: "PUNCT", "NUM", "X").
    pub part_of_speech: String,
    /// `false` para pontuação e símbolos.
    pub is_word: bool,
    /// Último token da sentença.
    pub is_sentence_end: bool,
    /// Há espaço em branco logo depois do token no texto original.
    pub has_trailing_space: bool,
}

impl Token {
    /// Token de palavra com lema igual à superfície. Útil para montar sentenças em testes.
    pub fn word(surface: &str) -> Self {
        Self {
            surface: surface.to_string(),
            lemma: surface.to_string(),
            part_of_speech: "X".to_string(),
            is_word: true,
            is_sentence_end: false,
            has_trailing_space: true,
        }
    }

    /// Token de pontuação sem espaço depois.
    pub fn punct(surface: &str) -> Self {
        Self {
            surface: surface.to_string(),
            lemma: surface.to_string(),
            part_of_speech: "PUNCT".to_string(),
            is_word: false,
            is_sentence_end: false,
            has_trailing_space: false,
        }
    }
}

/// Capacidade de tokenização de um idioma.
///
/// Implementações costumam ser caras de construir (carregam modelos estatísticos), por isso
/// o registro cria uma única instância por nome e a compartilha entre requisições.
pub trait TokenizerAdapter: Send + Sync {
    /// Nome com que o tokenizer foi registrado.
    fn name(&self) -> &str;

    /// Divide `text` em sentenças, cada uma como lista ordenada de tokens.
    fn split_into_sentences_and_tokens(&self, text: &str) -> Result<Vec<Vec<Token>>>;

    /// Tokeniza sem se importar com os limites de sentença.
    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        Ok(self
            .split_into_sentences_and_tokens(text)?
            .into_iter()
            .flatten()
            .collect())
    }
}

/// Fecha a sentença: o último token recebe `is_sentence_end`.
fn close_sentence(mut tokens: Vec<Token>) -> Vec<Token> {
    if let Some(last) = tokens.last_mut() {
        last.is_sentence_end = true;
    }
    tokens
}

fn number_pattern() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"^\p{N}+(?:[.,]\p{N}+)*$").expect("regex de número válida"))
}

/// Classe gramatical grosseira, sem modelo: pontuação, número, símbolo ou desconhecida.
fn coarse_part_of_speech(surface: &str) -> &'static str {
    if number_pattern().is_match(surface) {
        "NUM"
    } else if surface.chars().any(char::is_alphanumeric) {
        "X"
    } else if surface.chars().all(|c| c.is_ascii_punctuation() || is_unicode_punct(c)) {
        "PUNCT"
    } else {
        "SYM"
    }
}

fn is_unicode_punct(c: char) -> bool {
    matches!(
        c,
        '\u{2010}'..='\u{2027}' | '\u{3001}'..='\u{3003}' | '\u{3008}'..='\u{3011}'
            | '\u{FF01}' | '\u{FF08}' | '\u{FF09}' | '\u{FF0C}' | '\u{FF1A}' | '\u{FF1B}' | '\u{FF1F}'
            | '«' | '»' | '¿' | '¡'
    )
}

/// Tokenizer para idiomas com palavras separadas por espaço.
///
/// Usa os limites de sentença e de palavra do UAX #29. O lema é a superfície em minúsculas,
/// já que não há análise morfológica.
#[derive(Debug, Clone)]
pub struct EnglishTokenizer {
    name: String,
}

impl EnglishTokenizer {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }

    fn tokenize_sentence(sentence: &str) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();
        for piece in sentence.split_word_bounds() {
            if piece.chars().all(char::is_whitespace) {
                if let Some(last) = tokens.last_mut() {
                    last.has_trailing_space = true;
                }
                continue;
            }
            let pos = coarse_part_of_speech(piece);
            tokens.push(Token {
                surface: piece.to_string(),
                lemma: piece.to_lowercase(),
                part_of_speech: pos.to_string(),
                is_word: pos == "X" || pos == "NUM",
                is_sentence_end: false,
                has_trailing_space: false,
            });
        }
        close_sentence(tokens)
    }
}

impl TokenizerAdapter for EnglishTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn split_into_sentences_and_tokens(&self, text: &str) -> Result<Vec<Vec<Token>>> {
        Ok(text
            .split_sentence_bounds()
            .map(Self::tokenize_sentence)
            .filter(|sentence| !sentence.is_empty())
            .collect())
    }
}

/// Escrita de um caractere, para o agrupamento do [`CjkTokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Han,
    Hiragana,
    Katakana,
    Alnum,
    Space,
    Other,
}

fn script_of(c: char) -> Script {
    match c {
        '\u{3040}'..='\u{309F}' => Script::Hiragana,
        '\u{30A0}'..='\u{30FA}' | '\u{30FC}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' | '\u{FF66}'..='\u{FF9F}' => {
            Script::Katakana
        }
        '\u{3005}' | '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' | '\u{F900}'..='\u{FAFF}' => Script::Han,
        c if c.is_whitespace() => Script::Space,
        c if c.is_alphanumeric() => Script::Alnum,
        _ => Script::Other,
    }
}

const CJK_TERMINATORS: &[char] = &['。', '！', '？', '!', '?', '\n'];
const CJK_CLOSERS: &[char] = &['」', '』', '）', ')', '"', '”', '】'];

/// Tokenizer para línguas sem espaço entre palavras (japonês, chinês).
///
/// Os limites de sentença vêm só dos terminadores `。！？!?` e da quebra de linha, seguidos
/// de eventuais fechamentos de aspas/parênteses. Os tokens são sequências maximais de uma
/// mesma escrita; cada pontuação vira um token isolado. Ex: "私は元気です。" →
/// `私`, `は`, `元気`, `です`, `。`.
#[derive(Debug, Clone)]
pub struct CjkTokenizer {
    name: String,
}

impl CjkTokenizer {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }

    /// Corta o texto em sentenças, mantendo terminadores e fechamentos na sentença que encerram.
    fn split_sentences(text: &str) -> Vec<&str> {
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !CJK_TERMINATORS.contains(&c) {
                continue;
            }
            let mut end = i + c.len_utf8();
            while let Some(&(j, next)) = chars.peek() {
                if CJK_TERMINATORS.contains(&next) || CJK_CLOSERS.contains(&next) {
                    end = j + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            sentences.push(&text[start..end]);
            start = end;
        }
        if start < text.len() {
            sentences.push(&text[start..]);
        }
        sentences
    }

    fn tokenize_sentence(sentence: &str) -> Vec<Token> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut run = String::new();
        let mut run_script = Script::Space;

        for c in sentence.chars() {
            let script = script_of(c);
            let continues_run = script == run_script && !matches!(script, Script::Other | Script::Space);
            if !continues_run {
                flush_run(&mut tokens, &mut run, run_script);
            }
            match script {
                Script::Space => {
                    if let Some(last) = tokens.last_mut() {
                        last.has_trailing_space = true;
                    }
                }
                _ => run.push(c),
            }
            run_script = script;
        }
        flush_run(&mut tokens, &mut run, run_script);
        close_sentence(tokens)
    }
}

/// Fecha a sequência acumulada como um token (se não vazia).
fn flush_run(tokens: &mut Vec<Token>, run: &mut String, script: Script) {
    if run.is_empty() {
        return;
    }
    let part_of_speech = match script {
        Script::Other => coarse_part_of_speech(run),
        Script::Alnum => coarse_part_of_speech(run),
        _ => "X",
    };
    tokens.push(Token {
        surface: run.clone(),
        lemma: run.clone(),
        part_of_speech: part_of_speech.to_string(),
        is_word: script != Script::Other,
        is_sentence_end: false,
        has_trailing_space: false,
    });
    run.clear();
}

impl TokenizerAdapter for CjkTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn split_into_sentences_and_tokens(&self, text: &str) -> Result<Vec<Vec<Token>>> {
        Ok(Self::split_sentences(text)
            .into_iter()
            .map(Self::tokenize_sentence)
            .filter(|sentence| !sentence.is_empty())
            .collect())
    }
}

/// Fábrica de um tokenizer. Recebe o nome registrado.
pub type TokenizerFactory = Box<dyn Fn(&str) -> Result<Arc<dyn TokenizerAdapter>> + Send + Sync>;

/// Registro nome → fábrica, com cache de uma instância por nome.
///
/// É um objeto comum, injetado no [`Annotator`](crate::pipeline::Annotator): testes podem
/// montar um registro só com tokenizers falsos e determinísticos.
pub struct TokenizerRegistry {
    factories: HashMap<String, TokenizerFactory>,
    instances: RwLock<HashMap<String, Arc<dyn TokenizerAdapter>>>,
}

impl TokenizerRegistry {
    /// Registro vazio.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Registro com os tokenizers embutidos: `english`, `japanese` e `chinese`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let builtin: [(&str, fn(&str) -> Arc<dyn TokenizerAdapter>); 3] = [
            ("english", |name| Arc::new(EnglishTokenizer::new(name))),
            ("japanese", |name| Arc::new(CjkTokenizer::new(name))),
            ("chinese", |name| Arc::new(CjkTokenizer::new(name))),
        ];
        for (name, build) in builtin {
            let factory: TokenizerFactory = Box::new(move |n: &str| -> Result<Arc<dyn TokenizerAdapter>> { Ok(build(n)) });
            registry.factories.insert(name.to_string(), factory);
        }
        registry
    }

    /// Registra uma fábrica. Falha se o nome já estiver ocupado.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&str) -> Result<Arc<dyn TokenizerAdapter>> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(LectorError::ParserAlreadyRegistered(name.to_string()));
        }
        self.factories.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Nomes registrados, em ordem alfabética.
    pub fn languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Nome de exibição ("english" → "English").
    pub fn display_name(&self, name: &str) -> Option<String> {
        if !self.contains(name) {
            return None;
        }
        let mut chars = name.chars();
        chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect())
    }

    /// Devolve a instância do tokenizer, construindo-a na primeira chamada.
    pub fn get(&self, name: &str) -> Result<Arc<dyn TokenizerAdapter>> {
        if let Some(adapter) = self
            .instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(Arc::clone(adapter));
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LectorError::UnsupportedLanguage(name.to_string()))?;

        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        // Outra thread pode ter construído enquanto esperávamos o lock
        if let Some(adapter) = instances.get(name) {
            return Ok(Arc::clone(adapter));
        }
        tracing::info!(tokenizer = name, "instanciando tokenizer");
        let adapter = factory(name)?;
        instances.insert(name.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
