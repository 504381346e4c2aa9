use serde::{Deserialize, Serialize};

use crate::domain::null_as_default;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}
