use std::collections::HashMap;

const BUILTIN_PHRASES: [(&str, &str); 5] = [
    ("产品名称", "Product Name"),
    ("使用说明", "Instructions"),
    ("警告", "Warning"),
    ("特点", "Features"),
    ("规格", "Specifications"),
];

/// Offline phrase lookup used when the backend cannot translate a batch.
#[derive(Debug, Clone)]
pub struct PhraseTable {
    entries: HashMap<String, String>,
}

impl Default for PhraseTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PhraseTable {
    pub fn builtin() -> Self {
        let entries = BUILTIN_PHRASES
            .iter()
            .map(|(source, target)| (source.to_string(), target.to_string()))
            .collect();
        Self { entries }
    }

    pub fn with_entries<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (source, target) in entries {
            let source = source.into();
            let target = target.into();
            if !source.trim().is_empty() {
                self.entries.insert(source.trim().to_string(), target);
            }
        }
        self
    }

    pub fn lookup(&self, text: &str) -> Option<&str> {
        self.entries.get(text.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
