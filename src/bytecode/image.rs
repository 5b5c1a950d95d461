use crate::bytecode::Op;
use crate::lang::dictionary::Dictionary;
use crate::runtime::runtime_error::{ErrorKind, RuntimeError};
use serde::{Deserialize, Serialize};

/// Bumped whenever the serialized layout of words or ops changes.
pub const IMAGE_VERSION: u32 = 1;

#[derive(Serialize)]
struct ImageRef<'a> {
    version: u32,
    dictionary: &'a Dictionary,
}

#[derive(Deserialize)]
struct Image {
    version: u32,
    dictionary: Dictionary,
}

fn bad_image(message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(ErrorKind::BadImage(message.into()))
}

/// Serializes the whole dictionary, builtins included.
pub fn encode(dict: &Dictionary) -> Result<Vec<u8>, RuntimeError> {
    postcard::to_allocvec(&ImageRef {
        version: IMAGE_VERSION,
        dictionary: dict,
    })
    .map_err(|e| bad_image(e.to_string()))
}

/// Restores a dictionary written by [`encode`].
///
/// The image must start with exactly the entries [`Dictionary::bootstrap`]
/// creates, since compiled bodies refer to builtins by id.
pub fn decode(bytes: &[u8]) -> Result<Dictionary, RuntimeError> {
    let image: Image = postcard::from_bytes(bytes).map_err(|e| bad_image(e.to_string()))?;

    if image.version != IMAGE_VERSION {
        return Err(bad_image(format!(
            "unsupported version {} (expected {})",
            image.version, IMAGE_VERSION
        )));
    }

    validate(&image.dictionary)?;
    Ok(image.dictionary)
}

fn validate(dict: &Dictionary) -> Result<(), RuntimeError> {
    let boot = Dictionary::bootstrap();

    for (id, expected) in boot.iter() {
        if dict.get(id) != Some(expected) {
            return Err(bad_image(format!(
                "entry {} does not match bootstrap word `{}`",
                id,
                expected.name.trim()
            )));
        }
    }

    for (id, word) in dict.iter() {
        for op in word.body() {
            if let Op::Call(target) = op {
                if dict.get(*target).is_none() {
                    return Err(bad_image(format!(
                        "`{}` ({}) calls missing word {}",
                        word.name, id, target
                    )));
                }
            }
        }
    }

    Ok(())
}
