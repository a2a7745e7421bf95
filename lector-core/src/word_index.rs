//! # Índice de Palavras por Idioma
//!
//! Cache em memória `first_token → candidatos` usado pelo casador de sentenças. Cada balde
//! guarda as entradas que começam por aquele token, já ordenadas por `frequency_rank`
//! decrescente, que é a ordem em que o casador as testa.
//!
//! ## Ciclo de vida
//!
//! - **Construção preguiçosa**: o primeiro [`WordIndexCache::get_or_build`] de um idioma faz uma
//!   única consulta com todo o vocabulário e monta os baldes.
//! - **Atualização incremental**: após cada criação/alteração/remoção de vocabulário, a camada de
//!   escrita chama [`WordIndexCache::refresh_bucket`], que reconsulta só aquele balde.
//! - **Sem expiração**: um idioma só sai do cache por [`WordIndexCache::invalidate`].
//!
//! ## Concorrência
//!
//! Um [`WordIndex`] publicado nunca é alterado. A atualização monta uma cópia com o balde novo
//! (os demais baldes são `Arc` compartilhados) e troca o ponteiro do idioma de uma vez; quem já
//! tem o `Arc` antigo continua lendo um retrato consistente. Construções concorrentes do mesmo
//! idioma são serializadas por um lock por idioma, e a consulta ao armazenamento termina antes de
//! qualquer troca: uma falha deixa o índice no último estado bom.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::Result;
use crate::vocabulary::{LanguageId, VocabularyEntry, VocabularyStore};

/// Balde de candidatos, ordenado por frequência decrescente.
pub type Bucket = Arc<[VocabularyEntry]>;

/// Retrato imutável do índice de um idioma.
#[derive(Debug, Clone, Default)]
pub struct WordIndex {
    buckets: HashMap<String, Bucket>,
}

impl WordIndex {
    /// Agrupa entradas já ordenadas por frequência; a ordem relativa é preservada em cada balde.
    pub fn from_entries(entries: Vec<VocabularyEntry>) -> Self {
        let mut grouped: HashMap<String, Vec<VocabularyEntry>> = HashMap::new();
        for entry in entries {
            grouped.entry(entry.first_token.clone()).or_default().push(entry);
        }
        Self {
            buckets: grouped
                .into_iter()
                .map(|(key, bucket)| (key, Bucket::from(bucket)))
                .collect(),
        }
    }

    /// Candidatos cujo primeiro token é `first_token`.
    pub fn get(&self, first_token: &str) -> Option<&[VocabularyEntry]> {
        self.buckets.get(first_token).map(|bucket| &bucket[..])
    }

    pub fn contains_key(&self, first_token: &str) -> bool {
        self.buckets.contains_key(first_token)
    }

    /// Número de baldes.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Cópia do índice com o balde `first_token` substituído (ou removido se `entries` for vazio).
    fn with_bucket(&self, first_token: &str, entries: Vec<VocabularyEntry>) -> Self {
        let mut buckets = self.buckets.clone();
        if entries.is_empty() {
            buckets.remove(first_token);
        } else {
            buckets.insert(first_token.to_string(), Bucket::from(entries));
        }
        Self { buckets }
    }
}

/// Cache de [`WordIndex`] por idioma, alimentado por um [`VocabularyStore`].
pub struct WordIndexCache {
    store: Arc<dyn VocabularyStore>,
    indexes: RwLock<HashMap<LanguageId, Arc<WordIndex>>>,
    language_locks: Mutex<HashMap<LanguageId, Arc<Mutex<()>>>>,
}

impl WordIndexCache {
    pub fn new(store: Arc<dyn VocabularyStore>) -> Self {
        Self {
            store,
            indexes: RwLock::new(HashMap::new()),
            language_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Índice já construído do idioma, sem consultar o armazenamento.
    pub fn cached(&self, language_id: LanguageId) -> Option<Arc<WordIndex>> {
        self.indexes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&language_id)
            .cloned()
    }

    fn language_lock(&self, language_id: LanguageId) -> Arc<Mutex<()>> {
        let mut locks = self.language_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(language_id).or_default())
    }

    fn publish(&self, language_id: LanguageId, index: WordIndex) -> Arc<WordIndex> {
        let index = Arc::new(index);
        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(language_id, Arc::clone(&index));
        index
    }

    /// Devolve o índice do idioma, construindo-o com uma consulta completa na primeira vez.
    pub fn get_or_build(&self, language_id: LanguageId) -> Result<Arc<WordIndex>> {
        if let Some(index) = self.cached(language_id) {
            return Ok(index);
        }

        let lock = self.language_lock(language_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        // Quem segurava o lock antes pode já ter construído
        if let Some(index) = self.cached(language_id) {
            return Ok(index);
        }

        let entries = self.store.list_by_language(language_id)?;
        let total = entries.len();
        let index = WordIndex::from_entries(entries);
        tracing::info!(language_id, entries = total, buckets = index.len(), "índice de palavras construído");
        Ok(self.publish(language_id, index))
    }

    /// Reconsulta e substitui um único balde.
    ///
    /// Não faz nada se o idioma ainda não foi construído. Se a consulta voltar vazia, a chave
    /// sai do índice.
    pub fn refresh_bucket(&self, language_id: LanguageId, first_token: &str) -> Result<()> {
        let lock = self.language_lock(language_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(current) = self.cached(language_id) else {
            tracing::debug!(language_id, first_token, "índice não construído; refresh ignorado");
            return Ok(());
        };

        let entries = self.store.list_by_first_token(language_id, first_token)?;
        tracing::debug!(language_id, first_token, candidates = entries.len(), "balde atualizado");
        self.publish(language_id, current.with_bucket(first_token, entries));
        Ok(())
    }

    /// Remove o índice de um idioma; a próxima leitura reconstrói do zero.
    pub fn invalidate(&self, language_id: LanguageId) {
        let lock = self.language_lock(language_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&language_id);
        tracing::info!(language_id, "índice de palavras invalidado");
    }

    /// Esvazia o cache inteiro.
    pub fn invalidate_all(&self) {
        self.indexes.write().unwrap_or_else(|e| e.into_inner()).clear();
        tracing::info!("todos os índices de palavras invalidados");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LectorError, StoreError};
    use crate::vocabulary::{MemoryStore, NewVocabularyEntry, VocabularyWriter};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Armazenamento que conta consultas e pode ser forçado a falhar.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
        full_loads: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failing: AtomicBool::new(false),
                full_loads: AtomicUsize::new(0),
            }
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Query("conexão perdida".into()));
            }
            Ok(())
        }
    }

    impl VocabularyStore for FlakyStore {
        fn list_by_language(&self, language_id: LanguageId) -> Result<Vec<VocabularyEntry>, StoreError> {
            self.check()?;
            self.full_loads.fetch_add(1, Ordering::SeqCst);
            self.inner.list_by_language(language_id)
        }

        fn list_by_first_token(
            &self,
            language_id: LanguageId,
            first_token: &str,
        ) -> Result<Vec<VocabularyEntry>, StoreError> {
            self.check()?;
            self.inner.list_by_first_token(language_id, first_token)
        }
    }

    fn seeded() -> Arc<FlakyStore> {
        let store = FlakyStore::new();
        store.inner.insert(NewVocabularyEntry::new(1, "have", &["have"], 1)).unwrap();
        store.inner.insert(NewVocabularyEntry::new(1, "have to", &["have", "to"], 2)).unwrap();
        store.inner.insert(NewVocabularyEntry::new(1, "go", &["go"], 5)).unwrap();
        store.inner.insert(NewVocabularyEntry::new(2, "haben", &["haben"], 1)).unwrap();
        Arc::new(store)
    }

    fn surfaces(index: &WordIndex, key: &str) -> Vec<String> {
        index
            .get(key)
            .map(|bucket| bucket.iter().map(|e| e.surface.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_build_buckets_by_first_token() {
        let cache = WordIndexCache::new(seeded());
        let index = cache.get_or_build(1).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(surfaces(&index, "have"), vec!["have to", "have"]);
        assert!(!index.contains_key("haben"));
    }

    #[test]
    fn test_buckets_are_ranked() {
        let cache = WordIndexCache::new(seeded());
        let index = cache.get_or_build(1).unwrap();
        for key in index.keys() {
            let bucket = index.get(key).unwrap();
            assert!(bucket
                .windows(2)
                .all(|w| w[0].frequency_rank >= w[1].frequency_rank));
        }
    }

    #[test]
    fn test_build_is_cached() {
        let store = seeded();
        let cache = WordIndexCache::new(store.clone());
        let a = cache.get_or_build(1).unwrap();
        let b = cache.get_or_build(1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.full_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_builds_are_coalesced() {
        let store = seeded();
        let cache = Arc::new(WordIndexCache::new(store.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_build(1).unwrap().len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
        assert_eq!(store.full_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refresh_replaces_bucket() {
        let store = seeded();
        let cache = WordIndexCache::new(store.clone());
        let before = cache.get_or_build(1).unwrap();

        store.inner.insert(NewVocabularyEntry::new(1, "have got", &["have", "got"], 3)).unwrap();
        cache.refresh_bucket(1, "have").unwrap();

        let after = cache.get_or_build(1).unwrap();
        let fresh: Vec<String> = store
            .inner
            .list_by_first_token(1, "have")
            .unwrap()
            .into_iter()
            .map(|e| e.surface)
            .collect();
        assert_eq!(surfaces(&after, "have"), fresh);
        assert_eq!(surfaces(&after, "have")[0], "have got");
        // O retrato antigo continua íntegro
        assert_eq!(surfaces(&before, "have"), vec!["have to", "have"]);
    }

    #[test]
    fn test_refresh_removes_empty_bucket() {
        let store = seeded();
        let cache = WordIndexCache::new(store.clone());
        cache.get_or_build(1).unwrap();

        let go = store.inner.find_by_surface(1, "go").unwrap().unwrap();
        store.inner.remove(go.id).unwrap();
        cache.refresh_bucket(1, "go").unwrap();

        assert!(!cache.get_or_build(1).unwrap().contains_key("go"));
    }

    #[test]
    fn test_refresh_before_build_is_noop() {
        let store = seeded();
        let cache = WordIndexCache::new(store.clone());
        cache.refresh_bucket(1, "have").unwrap();
        assert!(cache.cached(1).is_none());
        assert_eq!(store.full_loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_refresh_keeps_last_good_state() {
        let store = seeded();
        let cache = WordIndexCache::new(store.clone());
        cache.get_or_build(1).unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let result = cache.refresh_bucket(1, "have");
        assert!(matches!(result, Err(LectorError::Store(_))));
        assert_eq!(surfaces(&cache.cached(1).unwrap(), "have"), vec!["have to", "have"]);
    }

    #[test]
    fn test_failed_build_publishes_nothing() {
        let store = seeded();
        store.failing.store(true, Ordering::SeqCst);
        let cache = WordIndexCache::new(store.clone());
        assert!(cache.get_or_build(1).is_err());
        assert!(cache.cached(1).is_none());

        store.failing.store(false, Ordering::SeqCst);
        assert_eq!(cache.get_or_build(1).unwrap().len(), 2);
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let store = seeded();
        let cache = WordIndexCache::new(store.clone());
        cache.get_or_build(1).unwrap();
        cache.get_or_build(2).unwrap();

        cache.invalidate(1);
        assert!(cache.cached(1).is_none());
        assert!(cache.cached(2).is_some());

        cache.get_or_build(1).unwrap();
        assert_eq!(store.full_loads.load(Ordering::SeqCst), 3);

        cache.invalidate_all();
        assert!(cache.cached(2).is_none());
    }
}
