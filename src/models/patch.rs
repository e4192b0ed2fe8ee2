use serde::{Deserialize, Deserializer};

/// A field in an update request.
///
/// Absent from the JSON body means `Unchanged`, an explicit `null` means
/// `Cleared`, and any value means `Set`. Fields must carry
/// `#[serde(default)]` so that absence maps to `Unchanged`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Set(T),
    Cleared,
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }

    /// Resolve against the current value of a nullable column.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Unchanged => current,
            Patch::Set(value) => Some(value),
            Patch::Cleared => None,
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Set(value),
            None => Patch::Cleared,
        })
    }
}
