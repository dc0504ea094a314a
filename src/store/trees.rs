pub const SUMMARIES: &str = "summaries";
pub const USERNAME_INDEX: &str = "username_index";
pub const META: &str = "meta";
