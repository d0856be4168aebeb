use thiserror::Error;

/// Reasons a [`crate::LanguageMode`] or [`crate::LanguageLayer`] operation can fail outright.
///
/// Most failure modes (missing queries, missing injection grammars, unmatched divided folds,
/// indent queries with no controlling layer) never reach this type — they are absorbed
/// internally and degrade the result instead. Only failures that make a layer unusable end up
/// here.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    #[error("parse timed out")]
    Timeout,
    #[error("source exceeds the maximum supported size")]
    ExceededMaximumSize,
    #[error("grammar rejected by the parser")]
    InvalidLanguage,
    #[error("included ranges were invalid or out of order")]
    InvalidRanges,
    #[error("unknown parsing error")]
    Unknown,
}
