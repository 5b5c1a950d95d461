use crate::bytecode::op::Op;
use crate::lang::word::{Builtin, Word, WordId, WordKind};
use serde::{Deserialize, Serialize};

/// Name of the anonymous idle-loop word. Tokens never contain whitespace, so
/// lookup can never reach it.
pub const IDLE_WORD: &str = " ";

/// Append-only table of words.
///
/// Lookup is a linear scan in insertion order and the first match wins, so a
/// later entry with a duplicate name can never be found by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    words: Vec<Word>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dictionary holding the idle loop and the primitive vocabulary.
    ///
    /// The idle loop is always `WordId(0)`: `PROMPT` followed by a jump back
    /// to it.
    pub fn bootstrap() -> Self {
        let mut dict = Dictionary::new();

        let idle = dict.add(IDLE_WORD);
        dict.append(idle, Op::Prompt);
        dict.append(idle, Op::Jump(-1));

        for (name, builtin, immediate) in Builtin::VOCABULARY {
            dict.add_builtin(name, builtin, immediate);
        }

        dict
    }

    /// Id of the idle-loop word installed by [`Dictionary::bootstrap`].
    pub fn idle() -> WordId {
        WordId(0)
    }

    /// Appends an empty compiled word. Callers check uniqueness first.
    pub fn add(&mut self, name: &str) -> WordId {
        self.words.push(Word::compiled(name));
        WordId(self.words.len() - 1)
    }

    pub fn add_builtin(&mut self, name: &str, builtin: Builtin, immediate: bool) -> WordId {
        debug_assert!(
            self.find(name).is_none(),
            "builtin `{}` registered twice",
            name
        );
        self.words.push(Word::native(name, builtin, immediate));
        WordId(self.words.len() - 1)
    }

    pub fn find(&self, name: &str) -> Option<(WordId, &Word)> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, word)| word.name == name)
            .map(|(i, word)| (WordId(i), word))
    }

    pub fn get(&self, id: WordId) -> Option<&Word> {
        self.words.get(id.index())
    }

    /// Appends an instruction to a compiled word's body.
    ///
    /// Returns false if `id` is unknown or names a native word.
    pub fn append(&mut self, id: WordId, op: Op) -> bool {
        match self.words.get_mut(id.index()).map(|w| &mut w.kind) {
            Some(WordKind::Compiled(ops)) => {
                ops.push(op);
                true
            }
            _ => false,
        }
    }

    pub fn name_of(&self, id: WordId) -> &str {
        self.get(id).map(|w| w.name.as_str()).unwrap_or("?")
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WordId, &Word)> {
        self.words
            .iter()
            .enumerate()
            .map(|(i, word)| (WordId(i), word))
    }
}
