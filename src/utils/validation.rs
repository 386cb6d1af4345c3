use crate::error::{EngineError, EngineResult};
use uuid::Uuid;

const MAX_ACTION_LEN: usize = 32;

pub fn validate_id(id: Uuid, what: &str) -> EngineResult<()> {
    if id.is_nil() {
        return Err(EngineError::InvalidInput(format!("{} cannot be nil", what)));
    }
    Ok(())
}

pub fn validate_track_request(user_id: Uuid, content_id: Uuid, action: &str) -> EngineResult<()> {
    validate_id(user_id, "User ID")?;
    validate_id(content_id, "Content ID")?;

    if action.trim().is_empty() {
        return Err(EngineError::InvalidInput("Action cannot be empty".to_string()));
    }
    if action.len() > MAX_ACTION_LEN {
        return Err(EngineError::InvalidInput(format!(
            "Action too long (max {} characters)",
            MAX_ACTION_LEN
        )));
    }

    Ok(())
}

pub fn validate_limit(limit: usize) -> EngineResult<()> {
    if limit == 0 {
        return Err(EngineError::InvalidInput(
            "Limit must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
