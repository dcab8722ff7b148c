use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Deserialize a registry snapshot, naming the JSON path of the first bad field.
pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8], origin: &Path) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        Error::Discovery(format!(
            "{}: at JSON path {path} → {}",
            origin.display(),
            err.into_inner()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Probe {
        #[allow(dead_code)]
        values: Vec<u32>,
    }

    #[test]
    fn error_carries_json_path() {
        let err = from_slice_with_path::<Probe>(br#"{"values": [1, "two"]}"#, Path::new("r.json"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("r.json"), "{msg}");
        assert!(msg.contains("values[1]"), "{msg}");
    }
}
