//! # Tipos de Erro
//!
//! Todos os erros que o pipeline de anotação pode produzir. Nenhum estágio devolve
//! resultado parcial: ou a lista completa de [`ParsedTextUnit`](crate::pipeline::ParsedTextUnit)
//! é produzida, ou um único erro é propagado.
//!
//! | Variante                    | Origem                 | Recuperável?                       |
//! |-----------------------------|------------------------|------------------------------------|
//! | `UnrecognizedMarkdownNode`  | segmentador            | não (documento malformado)         |
//! | `UnknownSegmentKind`        | segmentador            | não (documento malformado)         |
//! | `UnsupportedLanguage`       | registro de tokenizers | não (erro de configuração)         |
//! | `ParserAlreadyRegistered`   | registro de tokenizers | não (erro de configuração)         |
//! | `UnknownLanguageId`         | orquestrador           | não (idioma não cadastrado)        |
//! | `MatcherOverflow`           | casador de sentenças   | não (violação de invariante)       |
//! | `InvalidEntry`              | serviço de vocabulário | não (dados inválidos)              |
//! | `EntryNotFound`             | serviço de vocabulário | não                                |
//! | `Store`                     | índice de palavras     | sim, repetindo a operação inteira  |

use crate::vocabulary::{EntryId, LanguageId};

/// Result padrão do crate, com [`LectorError`] como erro default.
pub type Result<T, E = LectorError> = std::result::Result<T, E>;

/// Erro do pipeline de anotação.
#[derive(Debug, thiserror::Error)]
pub enum LectorError {
    /// Nó de bloco que o segmentador não sabe tratar (ex: lista, citação, tabela).
    #[error("nó markdown não reconhecido: {node}")]
    UnrecognizedMarkdownNode { node: String },

    /// Filho inline de parágrafo de tipo desconhecido (ex: ênfase, link).
    #[error("tipo de filho de parágrafo desconhecido: {kind}")]
    UnknownSegmentKind { kind: String },

    /// Nenhum tokenizer registrado com este nome.
    #[error("tokenizer '{0}' não está registrado")]
    UnsupportedLanguage(String),

    /// Tentativa de registrar duas vezes o mesmo nome de tokenizer.
    #[error("tokenizer '{0}' já está registrado")]
    ParserAlreadyRegistered(String),

    /// Idioma sem cadastro no diretório do anotador.
    #[error("idioma {0} não está cadastrado")]
    UnknownLanguageId(LanguageId),

    /// O guarda de laço do casador disparou. Indica bug no casador, nunca erro do usuário.
    #[error("limite de {limit} iterações excedido ao casar sentença com {tokens} tokens")]
    MatcherOverflow { limit: usize, tokens: usize },

    /// Entrada de vocabulário que viola as invariantes de `token_sequence`.
    #[error("entrada de vocabulário inválida: {0}")]
    InvalidEntry(String),

    /// Entrada de vocabulário inexistente.
    #[error("entrada de vocabulário {0} não encontrada")]
    EntryNotFound(EntryId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Falhas da camada de armazenamento consultada pelo índice.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A consulta não pôde ser executada (conexão, timeout, lock envenenado...).
    #[error("falha na consulta ao armazenamento: {0}")]
    Query(String),

    /// Os dados de carga inicial não puderam ser lidos.
    #[error("falha ao carregar vocabulário: {0}")]
    Load(#[from] serde_json::Error),
}

impl LectorError {
    /// Indica se repetir a operação inteira pode ter sucesso.
    ///
    /// Apenas falhas de armazenamento são transitórias; todo o resto é erro de
    /// documento, de configuração ou de invariante interna.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LectorError::Store(StoreError::Query(_)))
    }
}
