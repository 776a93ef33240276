use anyhow::Result;
use serde::Deserialize;

/// Reference stream loaded from a JSON file such as `{"word_addrs": [1, 2, 3]}`.
#[derive(Default, Deserialize, Debug, PartialEq, Eq)]
pub struct Trace {
    pub word_addrs: Vec<u32>,
}

impl Trace {
    pub fn deser(file: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(file)?)
    }
}
