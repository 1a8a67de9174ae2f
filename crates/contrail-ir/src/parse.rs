use crate::contract::ContractDecl;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn parse_contract(json: &str) -> Result<ContractDecl, ParseError> {
    Ok(serde_json::from_str(json)?)
}
