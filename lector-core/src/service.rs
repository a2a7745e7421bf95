//! # Serviço de Vocabulário
//!
//! Escritas no vocabulário passam por aqui para que o cache de índices nunca fique
//! desatualizado: cada escrita grava no armazenamento e em seguida recarrega os baldes
//! afetados via [`WordIndexCache::refresh_bucket`].
//!
//! | Operação          | Baldes recarregados                              |
//! |-------------------|--------------------------------------------------|
//! | `create`          | `first_token` da nova entrada                    |
//! | `update`          | `first_token` antigo e novo (idioma antigo/novo) |
//! | `delete`          | `first_token` da entrada removida                |
//! | `create_or_update`| conforme `create` ou `update`                    |
//!
//! Se a recarga falhar depois da escrita confirmada, o idioma sai do cache inteiro: a próxima
//! leitura reconstrói o índice a partir do armazenamento, e o erro é devolvido.

use std::sync::Arc;

use crate::error::{LectorError, Result};
use crate::vocabulary::{EntryId, LanguageId, NewVocabularyEntry, VocabularyEntry, VocabularyWriter};
use crate::word_index::WordIndexCache;

/// Fachada de escrita: armazenamento + cache de índices.
pub struct VocabularyService {
    store: Arc<dyn VocabularyWriter>,
    index: Arc<WordIndexCache>,
}

impl VocabularyService {
    /// O `index` deve ter sido construído sobre o mesmo `store`.
    pub fn new(store: Arc<dyn VocabularyWriter>, index: Arc<WordIndexCache>) -> Self {
        Self { store, index }
    }

    pub fn get(&self, id: EntryId) -> Result<VocabularyEntry> {
        self.store.get(id)?.ok_or(LectorError::EntryNotFound(id))
    }

    pub fn create(&self, entry: NewVocabularyEntry) -> Result<VocabularyEntry> {
        let created = self.store.insert(entry)?;
        self.refresh_after_commit(&[(created.language_id, created.first_token.as_str())])?;
        tracing::debug!(id = created.id, surface = %created.surface, "entrada criada");
        Ok(created)
    }

    /// Substitui a entrada `id`. Se a primeira palavra mudou, os dois baldes são recarregados.
    pub fn update(&self, id: EntryId, entry: NewVocabularyEntry) -> Result<VocabularyEntry> {
        let (old, new) = self.store.replace(id, entry)?;
        let old_key = (old.language_id, old.first_token.as_str());
        let new_key = (new.language_id, new.first_token.as_str());
        if old_key == new_key {
            self.refresh_after_commit(&[old_key])?;
        } else {
            self.refresh_after_commit(&[old_key, new_key])?;
        }
        tracing::debug!(id, surface = %new.surface, "entrada atualizada");
        Ok(new)
    }

    pub fn delete(&self, id: EntryId) -> Result<VocabularyEntry> {
        let removed = self.store.remove(id)?.ok_or(LectorError::EntryNotFound(id))?;
        self.refresh_after_commit(&[(removed.language_id, removed.first_token.as_str())])?;
        tracing::debug!(id, surface = %removed.surface, "entrada removida");
        Ok(removed)
    }

    /// Recarrega os baldes tocados por uma escrita já confirmada.
    fn refresh_after_commit(&self, buckets: &[(LanguageId, &str)]) -> Result<()> {
        for &(language_id, first_token) in buckets {
            if let Err(err) = self.index.refresh_bucket(language_id, first_token) {
                tracing::warn!(language_id, first_token, error = %err, "recarga de balde falhou; índice invalidado");
                for &(touched, _) in buckets {
                    self.index.invalidate(touched);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Atualiza a entrada de mesma superfície no idioma, ou cria uma nova.
    pub fn create_or_update(&self, entry: NewVocabularyEntry) -> Result<VocabularyEntry> {
        match self.store.find_by_surface(entry.language_id, &entry.surface)? {
            Some(existing) => self.update(existing.id, entry),
            None => self.create(entry),
        }
    }
}
