//! # Casador de Sentenças
//!
//! Percorre uma sentença tokenizada da esquerda para a direita e substitui tokens isolados
//! por entradas de vocabulário de um ou mais tokens encontradas no [`WordIndex`].
//!
//! ## Algoritmo (guloso, ranqueado, limitado)
//!
//! Para cada posição:
//! 1. A anotação padrão é o próprio token, sem vocabulário.
//! 2. Se a superfície do token é chave do índice, os candidatos do balde são testados **na ordem
//!    do balde** (frequência decrescente). O primeiro cuja `token_sequence` inteira casa com os
//!    tokens consecutivos vence, mesmo que um candidato menos frequente e mais longo também case.
//! 3. Num casamento, o ponteiro pula para o último token consumido: nenhum token de dentro da
//!    expressão é emitido de novo.
//!
//! ```text
//! tokens:  I   have   to   go   home   .
//!              └─ "have to" ─┘
//! saída:   I | have to | go | home | .
//! ```
//!
//! `is_sentence_end` e `has_trailing_space` de uma expressão vêm do **último** token consumido.
//!
//! O contador de iterações é só uma rede de segurança: a posição avança ao menos um token por
//! volta, então o limite nunca dispara com entrada normal. Se disparar, é bug do casador.

use serde::{Deserialize, Serialize};

use crate::error::{LectorError, Result};
use crate::tokenizer::Token;
use crate::vocabulary::{EntryId, VocabularyEntry};
use crate::word_index::WordIndex;

/// Fator padrão do limite de iterações: `fator × número de tokens + 1`.
pub const DEFAULT_LOOP_GUARD_FACTOR: usize = 100;

/// Palavra (ou expressão) anotada com os metadados de vocabulário do aprendiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnotatedWord {
    pub surface: String,
    pub lemma: String,
    pub part_of_speech: String,
    pub is_word: bool,
    pub is_sentence_end: bool,
    pub has_trailing_space: bool,
    /// Tokens cobertos por esta unidade (um só quando não houve casamento).
    pub matched_token_sequence: Vec<String>,
    pub is_multi_token_match: bool,
    /// Status de aprendizado; 0 para palavras fora do vocabulário.
    pub status: i32,
    pub gloss: Option<String>,
    pub pronunciation: Option<String>,
    pub vocabulary_entry_id: Option<EntryId>,
    pub image_ref: Option<String>,
}

impl AnnotatedWord {
    /// Anotação padrão de um token sem vocabulário.
    pub fn from_token(token: &Token) -> Self {
        Self {
            surface: token.surface.clone(),
            lemma: token.lemma.clone(),
            part_of_speech: token.part_of_speech.clone(),
            is_word: token.is_word,
            is_sentence_end: token.is_sentence_end,
            has_trailing_space: token.has_trailing_space,
            matched_token_sequence: vec![token.surface.clone()],
            is_multi_token_match: false,
            status: 0,
            gloss: None,
            pronunciation: None,
            vocabulary_entry_id: None,
            image_ref: None,
        }
    }

    /// Anotação de uma entrada casada que termina em `end_token`.
    pub fn from_entry(entry: &VocabularyEntry, end_token: &Token) -> Self {
        let lemma = if entry.lemma.is_empty() {
            entry.surface.clone()
        } else {
            entry.lemma.clone()
        };
        let part_of_speech = if entry.part_of_speech.is_empty() {
            "UNKNOWN".to_string()
        } else {
            entry.part_of_speech.clone()
        };
        Self {
            surface: entry.surface.clone(),
            lemma,
            part_of_speech,
            is_word: true,
            is_sentence_end: end_token.is_sentence_end,
            has_trailing_space: end_token.has_trailing_space,
            matched_token_sequence: entry.token_sequence.clone(),
            is_multi_token_match: entry.is_multi_token,
            status: entry.status,
            gloss: entry.gloss.clone(),
            pronunciation: entry.pronunciation.clone(),
            vocabulary_entry_id: Some(entry.id),
            image_ref: entry.image_ref.clone(),
        }
    }
}

/// Limite de iterações para uma sentença de `token_count` tokens.
pub fn loop_guard(token_count: usize, factor: usize) -> usize {
    factor.saturating_mul(token_count).saturating_add(1)
}

/// Posição do último token consumido se `sequence` casa a partir de `start`.
fn match_sequence(tokens: &[Token], start: usize, sequence: &[String]) -> Option<usize> {
    let mut cursor = start;
    for expected in sequence {
        if cursor >= tokens.len() || tokens[cursor].surface != *expected {
            return None;
        }
        cursor += 1;
    }
    // Sequência vazia não consome nada
    cursor.checked_sub(1).filter(|&end| end >= start)
}

/// Casa a sentença com o limite de iterações padrão.
pub fn match_sentence(tokens: &[Token], index: &WordIndex) -> Result<Vec<AnnotatedWord>> {
    match_sentence_bounded(tokens, index, loop_guard(tokens.len(), DEFAULT_LOOP_GUARD_FACTOR))
}

/// Casa a sentença, falhando com [`LectorError::MatcherOverflow`] se passar de `max_iterations`.
pub fn match_sentence_bounded(
    tokens: &[Token],
    index: &WordIndex,
    max_iterations: usize,
) -> Result<Vec<AnnotatedWord>> {
    let mut words = Vec::with_capacity(tokens.len());
    let mut position = 0;
    let mut iterations = 0;

    while position < tokens.len() {
        let token = &tokens[position];
        let mut best = None;

        if let Some(candidates) = index.get(&token.surface) {
            for entry in candidates {
                if let Some(end) = match_sequence(tokens, position, &entry.token_sequence) {
                    best = Some(AnnotatedWord::from_entry(entry, &tokens[end]));
                    position = end;
                    break;
                }
            }
        }

        words.push(best.unwrap_or_else(|| AnnotatedWord::from_token(token)));
        position += 1;

        iterations += 1;
        if iterations > max_iterations {
            tracing::error!(limit = max_iterations, tokens = tokens.len(), "casador excedeu o limite de iterações");
            return Err(LectorError::MatcherOverflow {
                limit: max_iterations,
                tokens: tokens.len(),
            });
        }
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::NewVocabularyEntry;

    fn entry(id: EntryId, surface: &str, tokens: &[&str], freq: i64, status: i32, gloss: &str) -> VocabularyEntry {
        let mut new = NewVocabularyEntry::new(1, surface, tokens, freq);
        new.part_of_speech = "v".into();
        new.status = status;
        new.gloss = Some(gloss.into());
        new.into_entry(id).unwrap()
    }

    /// `{"have": [have to (freq 2), have (freq 1)]}`
    fn have_index() -> WordIndex {
        WordIndex::from_entries(vec![
            entry(2, "have to", &["have", "to"], 2, 2, "must do something"),
            entry(1, "have", &["have"], 1, 1, "own"),
        ])
    }

    fn sentence(surfaces: &[&str]) -> Vec<Token> {
        let mut tokens: Vec<Token> = surfaces
            .iter()
            .map(|s| {
                if s.chars().any(char::is_alphanumeric) {
                    Token::word(s)
                } else {
                    Token::punct(s)
                }
            })
            .collect();
        let last = tokens.len() - 1;
        tokens[last].is_sentence_end = true;
        if last > 0 {
            tokens[last - 1].has_trailing_space = false;
        }
        tokens
    }

    fn surfaces(words: &[AnnotatedWord]) -> Vec<&str> {
        words.iter().map(|w| w.surface.as_str()).collect()
    }

    #[test]
    fn test_multi_token_match() {
        let tokens = sentence(&["I", "have", "to", "go", "home", "."]);
        let words = match_sentence(&tokens, &have_index()).unwrap();

        assert_eq!(surfaces(&words), vec!["I", "have to", "go", "home", "."]);
        let have_to = &words[1];
        assert!(have_to.is_multi_token_match);
        assert_eq!(have_to.matched_token_sequence, vec!["have", "to"]);
        assert_eq!(have_to.status, 2);
        assert_eq!(have_to.gloss.as_deref(), Some("must do something"));
        assert_eq!(have_to.vocabulary_entry_id, Some(2));
        assert!(have_to.has_trailing_space);

        assert_eq!(words[0].status, 0);
        assert_eq!(words[0].gloss, None);
        assert!(!words[3].has_trailing_space);
        assert!(!words[4].is_word);
        assert!(words[4].is_sentence_end);
    }

    #[test]
    fn test_falls_back_to_single_token_entry() {
        let tokens = sentence(&["I", "have", "dinner", "."]);
        let words = match_sentence(&tokens, &have_index()).unwrap();

        assert_eq!(surfaces(&words), vec!["I", "have", "dinner", "."]);
        assert_eq!(words[1].vocabulary_entry_id, Some(1));
        assert!(!words[1].is_multi_token_match);
        assert_eq!(words[1].gloss.as_deref(), Some("own"));
        assert_eq!(words[2].vocabulary_entry_id, None);
        assert_eq!(words[2].matched_token_sequence, vec!["dinner"]);
    }

    #[test]
    fn test_frequency_order_beats_length() {
        // "look up to" é mais longo, mas "look up" é mais frequente e é testado antes
        let index = WordIndex::from_entries(vec![
            entry(1, "look up", &["look", "up"], 9, 1, "search"),
            entry(2, "look up to", &["look", "up", "to"], 3, 1, "admire"),
        ]);
        let tokens = sentence(&["I", "look", "up", "to", "her", "."]);
        let words = match_sentence(&tokens, &index).unwrap();
        assert_eq!(surfaces(&words), vec!["I", "look up", "to", "her", "."]);
    }

    #[test]
    fn test_match_flags_come_from_last_token() {
        let index = WordIndex::from_entries(vec![entry(1, "go home", &["go", "home"], 1, 1, "")]);
        let mut tokens = sentence(&["go", "home"]);
        tokens[0].has_trailing_space = true;
        tokens[1].has_trailing_space = false;
        let words = match_sentence(&tokens, &index).unwrap();
        assert_eq!(words.len(), 1);
        assert!(words[0].is_sentence_end);
        assert!(!words[0].has_trailing_space);
    }

    #[test]
    fn test_partial_sequence_at_sentence_end() {
        let tokens = sentence(&["we", "have"]);
        let words = match_sentence(&tokens, &have_index()).unwrap();
        assert_eq!(surfaces(&words), vec!["we", "have"]);
        assert_eq!(words[1].vocabulary_entry_id, Some(1));
    }

    #[test]
    fn test_empty_lemma_and_pos_fallbacks() {
        let mut bare = NewVocabularyEntry::new(1, "to", &["to"], 1);
        bare.lemma.clear();
        let index = WordIndex::from_entries(vec![bare.into_entry(5).unwrap()]);
        let words = match_sentence(&sentence(&["to", "."]), &index).unwrap();
        assert_eq!(words[0].lemma, "to");
        assert_eq!(words[0].part_of_speech, "UNKNOWN");
        assert!(words[0].is_word);
    }

    #[test]
    fn test_output_never_exceeds_token_count() {
        let index = have_index();
        let cases: [&[&str]; 4] = [
            &["have", "to", "have", "to"],
            &["have", "have", "have"],
            &["to", "have"],
            &["."],
        ];
        for case in cases {
            let tokens = sentence(case);
            let words = match_sentence(&tokens, &index).unwrap();
            assert!(words.len() <= tokens.len());
            let covered: usize = words.iter().map(|w| w.matched_token_sequence.len()).sum();
            assert_eq!(covered, tokens.len());
        }
    }

    #[test]
    fn test_empty_sentence() {
        assert!(match_sentence(&[], &have_index()).unwrap().is_empty());
    }

    #[test]
    fn test_loop_guard_trips() {
        let tokens = sentence(&["a", "b", "c"]);
        let result = match_sentence_bounded(&tokens, &WordIndex::default(), 1);
        assert!(matches!(
            result,
            Err(LectorError::MatcherOverflow { limit: 1, tokens: 3 })
        ));
    }

    #[test]
    fn test_loop_guard_scales_with_tokens() {
        assert_eq!(loop_guard(0, 100), 1);
        assert_eq!(loop_guard(6, 100), 601);
        assert_eq!(loop_guard(usize::MAX, 2), usize::MAX);
    }
}
