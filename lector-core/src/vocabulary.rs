//! # Vocabulário do Aprendiz
//!
//! Define a entrada de vocabulário ([`VocabularyEntry`]) e a superfície de consulta que o
//! índice de palavras usa para se construir ([`VocabularyStore`]).
//!
//! O armazenamento "de verdade" é uma tabela relacional externa; o núcleo só conhece as duas
//! consultas abaixo, sempre ordenadas por `frequency_rank` decrescente:
//!
//! 1. todas as entradas de um idioma;
//! 2. as entradas de um idioma cujo primeiro token é `first_token`.
//!
//! [`MemoryStore`] implementa essa superfície em memória (testes e servidor de demonstração).

use std::cmp::Reverse;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{LectorError, Result, StoreError};

/// Identificador de uma entrada de vocabulário no armazenamento.
pub type EntryId = i64;
/// Identificador de um idioma no armazenamento.
pub type LanguageId = i64;

/// Uma palavra ou expressão que o aprendiz salvou.
///
/// A `token_sequence` é a sequência exata de superfícies que precisa aparecer de forma
/// consecutiva numa sentença para que a entrada case. Ex: "have to" → `["have", "to"]`.
///
/// # Invariantes
/// - `token_sequence` não é vazia;
/// - `first_token == token_sequence[0]` (é a chave do balde no índice);
/// - `is_multi_token == (token_sequence.len() > 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: EntryId,
    pub language_id: LanguageId,
    /// Texto completo casado (ex: "have to").
    pub surface: String,
    pub lemma: String,
    pub part_of_speech: String,
    pub is_multi_token: bool,
    /// Nível de proficiência do aprendiz. Opaco para o núcleo.
    pub status: i32,
    pub pronunciation: Option<String>,
    /// Explicação/tradução curta mostrada ao leitor.
    pub gloss: Option<String>,
    /// Contagem usada apenas para ordenar candidatos.
    pub frequency_rank: Option<i64>,
    pub token_sequence: Vec<String>,
    pub first_token: String,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl VocabularyEntry {
    /// Verifica as invariantes de `token_sequence`.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.token_sequence.first() else {
            return Err(LectorError::InvalidEntry(format!(
                "'{}' não tem tokens",
                self.surface
            )));
        };
        if *first != self.first_token {
            return Err(LectorError::InvalidEntry(format!(
                "'{}': first_token '{}' difere de token_sequence[0] '{}'",
                self.surface, self.first_token, first
            )));
        }
        if self.is_multi_token != (self.token_sequence.len() > 1) {
            return Err(LectorError::InvalidEntry(format!(
                "'{}': is_multi_token inconsistente com {} tokens",
                self.surface,
                self.token_sequence.len()
            )));
        }
        Ok(())
    }
}

/// Dados de criação/atualização de uma entrada.
///
/// `first_token` e `is_multi_token` não fazem parte da entrada: são sempre derivados de
/// `token_sequence` em [`NewVocabularyEntry::into_entry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVocabularyEntry {
    pub language_id: LanguageId,
    pub surface: String,
    #[serde(default)]
    pub lemma: String,
    #[serde(default)]
    pub part_of_speech: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub pronunciation: Option<String>,
    #[serde(default)]
    pub gloss: Option<String>,
    #[serde(default)]
    pub frequency_rank: Option<i64>,
    pub token_sequence: Vec<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl NewVocabularyEntry {
    /// Atalho para testes e carga de dados: superfície, tokens e frequência.
    pub fn new(language_id: LanguageId, surface: &str, tokens: &[&str], frequency_rank: i64) -> Self {
        Self {
            language_id,
            surface: surface.to_string(),
            lemma: surface.to_string(),
            part_of_speech: String::new(),
            status: 0,
            pronunciation: None,
            gloss: None,
            frequency_rank: Some(frequency_rank),
            token_sequence: tokens.iter().map(|t| t.to_string()).collect(),
            image_ref: None,
        }
    }

    /// Materializa a entrada com o `id` dado, derivando a chave do índice.
    pub fn into_entry(self, id: EntryId) -> Result<VocabularyEntry> {
        let first_token = match self.token_sequence.first() {
            Some(first) if !first.is_empty() => first.clone(),
            _ => {
                return Err(LectorError::InvalidEntry(format!(
                    "'{}' precisa de ao menos um token não vazio",
                    self.surface
                )))
            }
        };
        Ok(VocabularyEntry {
            id,
            language_id: self.language_id,
            is_multi_token: self.token_sequence.len() > 1,
            surface: self.surface,
            lemma: self.lemma,
            part_of_speech: self.part_of_speech,
            status: self.status,
            pronunciation: self.pronunciation,
            gloss: self.gloss,
            frequency_rank: self.frequency_rank,
            token_sequence: self.token_sequence,
            first_token,
            image_ref: self.image_ref,
        })
    }
}

/// Superfície de consulta usada pelo índice de palavras.
///
/// As duas consultas devolvem entradas ordenadas por `frequency_rank` decrescente; empates
/// mantêm a ordem do armazenamento (ordenação estável). Entradas sem `frequency_rank` vêm por último.
pub trait VocabularyStore: Send + Sync {
    /// Todas as entradas do idioma.
    fn list_by_language(&self, language_id: LanguageId) -> Result<Vec<VocabularyEntry>, StoreError>;

    /// Entradas do idioma cujo primeiro token é `first_token`.
    fn list_by_first_token(
        &self,
        language_id: LanguageId,
        first_token: &str,
    ) -> Result<Vec<VocabularyEntry>, StoreError>;
}

/// Operações de escrita usadas pelo [`VocabularyService`](crate::service::VocabularyService).
pub trait VocabularyWriter: VocabularyStore {
    fn get(&self, id: EntryId) -> Result<Option<VocabularyEntry>, StoreError>;

    fn find_by_surface(
        &self,
        language_id: LanguageId,
        surface: &str,
    ) -> Result<Option<VocabularyEntry>, StoreError>;

    fn insert(&self, entry: NewVocabularyEntry) -> Result<VocabularyEntry>;

    /// Substitui a entrada `id`, devolvendo a versão anterior.
    fn replace(&self, id: EntryId, entry: NewVocabularyEntry) -> Result<(VocabularyEntry, VocabularyEntry)>;

    fn remove(&self, id: EntryId) -> Result<Option<VocabularyEntry>, StoreError>;
}

/// Ordena por `frequency_rank` decrescente, preservando a ordem original nos empates.
pub fn rank_descending(entries: &mut [VocabularyEntry]) {
    entries.sort_by_key(|e| Reverse(e.frequency_rank));
}

#[derive(Default)]
struct MemoryTable {
    rows: Vec<VocabularyEntry>,
    next_id: EntryId,
}

/// Tabela de vocabulário em memória.
///
/// As linhas ficam em ordem de inserção, que é o critério de desempate das consultas.
#[derive(Default)]
pub struct MemoryStore {
    table: RwLock<MemoryTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cria a tabela a partir de um array JSON de [`NewVocabularyEntry`].
    pub fn from_json(json: &str) -> Result<Self> {
        let seed: Vec<NewVocabularyEntry> = serde_json::from_str(json).map_err(StoreError::from)?;
        let store = Self::new();
        for entry in seed {
            store.insert(entry)?;
        }
        Ok(store)
    }

    /// Número de linhas da tabela (todos os idiomas).
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select<F>(&self, filter: F) -> Result<Vec<VocabularyEntry>, StoreError>
    where
        F: Fn(&VocabularyEntry) -> bool,
    {
        let table = self.table.read().map_err(|_| poisoned())?;
        let mut rows: Vec<VocabularyEntry> = table.rows.iter().filter(|e| filter(e)).cloned().collect();
        rank_descending(&mut rows);
        Ok(rows)
    }
}

fn poisoned() -> StoreError {
    StoreError::Query("lock da tabela envenenado".to_string())
}

impl VocabularyStore for MemoryStore {
    fn list_by_language(&self, language_id: LanguageId) -> Result<Vec<VocabularyEntry>, StoreError> {
        self.select(|e| e.language_id == language_id)
    }

    fn list_by_first_token(
        &self,
        language_id: LanguageId,
        first_token: &str,
    ) -> Result<Vec<VocabularyEntry>, StoreError> {
        self.select(|e| e.language_id == language_id && e.first_token == first_token)
    }
}

impl VocabularyWriter for MemoryStore {
    fn get(&self, id: EntryId) -> Result<Option<VocabularyEntry>, StoreError> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table.rows.iter().find(|e| e.id == id).cloned())
    }

    fn find_by_surface(
        &self,
        language_id: LanguageId,
        surface: &str,
    ) -> Result<Option<VocabularyEntry>, StoreError> {
        let table = self.table.read().map_err(|_| poisoned())?;
        Ok(table
            .rows
            .iter()
            .find(|e| e.language_id == language_id && e.surface == surface)
            .cloned())
    }

    fn insert(&self, entry: NewVocabularyEntry) -> Result<VocabularyEntry> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        let row = entry.into_entry(table.next_id + 1)?;
        table.next_id = row.id;
        table.rows.push(row.clone());
        Ok(row)
    }

    fn replace(&self, id: EntryId, entry: NewVocabularyEntry) -> Result<(VocabularyEntry, VocabularyEntry)> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        let row = entry.into_entry(id)?;
        let slot = table
            .rows
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(LectorError::EntryNotFound(id))?;
        let old = std::mem::replace(slot, row.clone());
        Ok((old, row))
    }

    fn remove(&self, id: EntryId) -> Result<Option<VocabularyEntry>, StoreError> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        let position = table.rows.iter().position(|e| e.id == id);
        Ok(position.map(|i| table.rows.remove(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_entry_derives_key() {
        let entry = NewVocabularyEntry::new(1, "have to", &["have", "to"], 2)
            .into_entry(7)
            .unwrap();
        assert_eq!(entry.first_token, "have");
        assert!(entry.is_multi_token);
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_into_entry_rejects_empty_sequence() {
        let entry = NewVocabularyEntry::new(1, "nada", &[], 1);
        assert!(matches!(entry.into_entry(1), Err(LectorError::InvalidEntry(_))));
    }

    #[test]
    fn test_validate_detects_broken_key() {
        let mut entry = NewVocabularyEntry::new(1, "go", &["go"], 1).into_entry(1).unwrap();
        entry.first_token = "went".into();
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_queries_rank_by_frequency_with_stable_ties() {
        let store = MemoryStore::new();
        store.insert(NewVocabularyEntry::new(1, "have", &["have"], 1)).unwrap();
        store.insert(NewVocabularyEntry::new(1, "have to", &["have", "to"], 2)).unwrap();
        store.insert(NewVocabularyEntry::new(1, "have got", &["have", "got"], 1)).unwrap();
        store.insert(NewVocabularyEntry::new(2, "haben", &["haben"], 9)).unwrap();

        let bucket = store.list_by_first_token(1, "have").unwrap();
        let surfaces: Vec<&str> = bucket.iter().map(|e| e.surface.as_str()).collect();
        assert_eq!(surfaces, vec!["have to", "have", "have got"]);

        assert_eq!(store.list_by_language(1).unwrap().len(), 3);
        assert_eq!(store.list_by_language(2).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_rank_sorts_last() {
        let store = MemoryStore::new();
        let mut unranked = NewVocabularyEntry::new(1, "go", &["go"], 0);
        unranked.frequency_rank = None;
        store.insert(unranked).unwrap();
        store.insert(NewVocabularyEntry::new(1, "go on", &["go", "on"], 0)).unwrap();

        let bucket = store.list_by_first_token(1, "go").unwrap();
        assert_eq!(bucket[0].surface, "go on");
        assert_eq!(bucket[1].surface, "go");
    }

    #[test]
    fn test_replace_keeps_row_position() {
        let store = MemoryStore::new();
        let a = store.insert(NewVocabularyEntry::new(1, "a", &["a"], 1)).unwrap();
        store.insert(NewVocabularyEntry::new(1, "b", &["a", "b"], 1)).unwrap();

        let (old, new) = store
            .replace(a.id, NewVocabularyEntry::new(1, "a!", &["a"], 1))
            .unwrap();
        assert_eq!(old.surface, "a");
        assert_eq!(new.surface, "a!");
        let bucket = store.list_by_first_token(1, "a").unwrap();
        assert_eq!(bucket[0].surface, "a!");
    }

    #[test]
    fn test_from_json_seed() {
        let json = r#"[
            {"language_id": 1, "surface": "have to", "token_sequence": ["have", "to"], "frequency_rank": 2},
            {"language_id": 1, "surface": "have", "token_sequence": ["have"], "gloss": "own"}
        ]"#;
        let store = MemoryStore::from_json(json).unwrap();
        assert_eq!(store.len(), 2);
        let have = store.find_by_surface(1, "have").unwrap().unwrap();
        assert_eq!(have.gloss.as_deref(), Some("own"));
        assert!(!have.is_multi_token);
    }

    #[test]
    fn test_rejected_insert_keeps_id_sequence() {
        let store = MemoryStore::new();
        let first = store.insert(NewVocabularyEntry::new(1, "go", &["go"], 1)).unwrap();
        assert!(store.insert(NewVocabularyEntry::new(1, "empty", &[], 1)).is_err());
        let second = store.insert(NewVocabularyEntry::new(1, "run", &["run"], 1)).unwrap();
        assert_eq!(second.id, first.id + 1);
    }
}
