//! Chat markup helpers.

pub fn mention_user(user_id: u64) -> String {
    format!("<@{user_id}>")
}

pub fn mention_role(role_id: u64) -> String {
    format!("<@&{role_id}>")
}

pub fn mention_channel(channel_id: u64) -> String {
    format!("<#{channel_id}>")
}

/// Client-rendered timestamp; `style` is one of `t T d D f F R`
pub fn timestamp(epoch_secs: i64, style: &str) -> String {
    match style {
        "t" | "T" | "d" | "D" | "f" | "F" | "R" => format!("<t:{epoch_secs}:{style}>"),
        _ => format!("<t:{epoch_secs}>"),
    }
}

pub fn relative_time(epoch_secs: i64) -> String {
    timestamp(epoch_secs, "R")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions() {
        assert_eq!(mention_user(42), "<@42>");
        assert_eq!(mention_role(7), "<@&7>");
        assert_eq!(mention_channel(9), "<#9>");
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(timestamp(1_700_000_000, "F"), "<t:1700000000:F>");
        assert_eq!(timestamp(1_700_000_000, "bogus"), "<t:1700000000>");
        assert_eq!(relative_time(5), "<t:5:R>");
    }
}
