/// What a lookup string refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserKey {
    Id(u64),
    Username(String),
}

/// All-digit input is a numeric id, anything else a username. Input is
/// trimmed first.
pub fn parse_user_key(input: &str) -> Result<UserKey, &'static str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Enter a user id or username");
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<u64>()
            .map(UserKey::Id)
            .map_err(|_| "User id is out of range");
    }
    Ok(UserKey::Username(trimmed.to_string()))
}

pub fn parse_user_id(input: &str) -> Result<u64, &'static str> {
    match parse_user_key(input)? {
        UserKey::Id(id) => Ok(id),
        UserKey::Username(_) => Err("User id must be numeric"),
    }
}
