pub mod call;
pub mod company;
pub mod contact;
pub mod lead;

use serde::{Deserialize, Deserializer};

/// Reads an explicit `null` as the type's default, the same as a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
