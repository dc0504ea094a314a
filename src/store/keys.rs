/// Zero-padded so that sled's byte order matches numeric order.
pub fn summary_key(user_id: u64) -> String {
    format!("{:020}", user_id)
}

pub fn parse_summary_key(key: &[u8]) -> Option<u64> {
    std::str::from_utf8(key).ok()?.parse::<u64>().ok()
}

pub fn username_index_key(username: &str) -> String {
    normalize_username(username)
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}
