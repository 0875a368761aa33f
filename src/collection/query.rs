//! Range query descriptors

/// Which documents of a collection a range query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AllDocsQuery {
    /// Every document in the collection
    #[default]
    All,
    /// Documents whose id starts with the given prefix
    Prefix(String),
    /// Exactly these ids, in this order; absent ones are skipped
    Keys(Vec<String>),
}

impl AllDocsQuery {
    /// An empty prefix means the whole collection.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix.is_empty() {
            AllDocsQuery::All
        } else {
            AllDocsQuery::Prefix(prefix)
        }
    }

    pub fn keys<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllDocsQuery::Keys(ids.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for AllDocsQuery {
    fn from(prefix: &str) -> Self {
        AllDocsQuery::prefix(prefix)
    }
}

impl From<Vec<String>> for AllDocsQuery {
    fn from(ids: Vec<String>) -> Self {
        AllDocsQuery::Keys(ids)
    }
}
