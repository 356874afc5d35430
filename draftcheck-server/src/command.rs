/// Command parsing for @draftcheck mentions in PR comments
use std::fmt;

/// The mention that addresses the bot. Must start a line.
pub const BOT_MENTION: &str = "@draftcheck";

/// Options for the review command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReviewOptions {
    /// Explicit markdown file to review (e.g. "posts/launch.md"). When
    /// absent, the first changed `.md` file in the PR is used.
    pub file: Option<String>,
}

/// A parsed draftcheck command from a comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Request an article review with optional parameters
    Review(ReviewOptions),
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotCommand::Review(opts) => {
                write!(f, "review")?;
                if let Some(file) = &opts.file {
                    write!(f, " file:{}", file)?;
                }
                Ok(())
            }
        }
    }
}

/// Result of parsing a comment for draftcheck commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// No mention of the bot in the comment
    NoMention,
    /// Bot was mentioned but the command was not recognized
    UnrecognizedCommand {
        /// The unrecognized command text that was attempted
        attempted: String,
    },
    /// A valid command was found
    Command(BotCommand),
}

/// Parse key:value options from a space-separated string
///
/// Unrecognized keys are ignored (for forward compatibility).
/// Empty values (e.g. "file:") are ignored.
fn parse_review_options(options_str: &str) -> ReviewOptions {
    let mut opts = ReviewOptions::default();

    for token in options_str.split_whitespace() {
        if let Some((key, value)) = token.split_once(':') {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            // Only lowercase the key for comparison; file paths keep their case
            match key.to_lowercase().as_str() {
                "file" => opts.file = Some(value.to_string()),
                _ => {}
            }
        }
    }

    opts
}

/// Parse a comment body for draftcheck commands
///
/// The mention must be at the beginning of a line (after trimming), followed
/// by whitespace and the command name. The first line starting with the
/// mention wins, even if its command is unrecognized.
pub fn parse_comment(body: &str) -> ParseResult {
    for line in body.lines() {
        let trimmed = line.trim();

        // Use safe prefix extraction to avoid panicking on non-ASCII input
        let Some(prefix) = trimmed.get(..BOT_MENTION.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(BOT_MENTION) {
            continue;
        }

        // Safe to slice here because we already verified the boundary exists
        let rest = &trimmed[BOT_MENTION.len()..];
        // Reject longer handles like "@draftchecker".
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            continue;
        }

        let rest = rest.trim();
        let mut parts = rest.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or("");
        let options = parts.next().unwrap_or("");

        return match command.to_lowercase().as_str() {
            "review" => ParseResult::Command(BotCommand::Review(parse_review_options(options))),
            other => ParseResult::UnrecognizedCommand {
                attempted: other.to_string(),
            },
        };
    }

    ParseResult::NoMention
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_mention() {
        assert_eq!(parse_comment("Looks good to me!"), ParseResult::NoMention);
    }

    #[test]
    fn test_mention_mid_line_is_ignored() {
        assert_eq!(
            parse_comment("please run @draftcheck review"),
            ParseResult::NoMention
        );
    }

    #[test]
    fn test_multibyte_character_at_mention_boundary() {
        // 'é' is two bytes and straddles the mention-length byte index; the
        // parser must skip the line rather than panic on the char boundary.
        assert_eq!(parse_comment("@draftchecé review"), ParseResult::NoMention);
        assert_eq!(parse_comment("@draftcheçk review"), ParseResult::NoMention);
        assert_eq!(parse_comment("héllo @draftcheck"), ParseResult::NoMention);
    }

    #[test]
    fn test_longer_handle_is_not_a_mention() {
        assert_eq!(
            parse_comment("@draftchecker review"),
            ParseResult::NoMention
        );
    }

    #[test]
    fn test_plain_review_command() {
        assert_eq!(
            parse_comment("@draftcheck review"),
            ParseResult::Command(BotCommand::Review(ReviewOptions::default()))
        );
    }

    #[test]
    fn test_review_command_is_case_insensitive() {
        assert_eq!(
            parse_comment("@DraftCheck REVIEW"),
            ParseResult::Command(BotCommand::Review(ReviewOptions::default()))
        );
    }

    #[test]
    fn test_review_with_file_option() {
        assert_eq!(
            parse_comment("@draftcheck review file:posts/Launch.md"),
            ParseResult::Command(BotCommand::Review(ReviewOptions {
                file: Some("posts/Launch.md".to_string()),
            }))
        );
    }

    #[test]
    fn test_empty_option_value_is_ignored() {
        assert_eq!(
            parse_comment("@draftcheck review file:"),
            ParseResult::Command(BotCommand::Review(ReviewOptions::default()))
        );
    }

    #[test]
    fn test_unknown_option_keys_are_ignored() {
        assert_eq!(
            parse_comment("@draftcheck review speed:fast file:a.md"),
            ParseResult::Command(BotCommand::Review(ReviewOptions {
                file: Some("a.md".to_string()),
            }))
        );
    }

    #[test]
    fn test_unrecognized_command() {
        assert_eq!(
            parse_comment("@draftcheck publish"),
            ParseResult::UnrecognizedCommand {
                attempted: "publish".to_string()
            }
        );
    }

    #[test]
    fn test_bare_mention_is_unrecognized() {
        assert_eq!(
            parse_comment("@draftcheck"),
            ParseResult::UnrecognizedCommand {
                attempted: String::new()
            }
        );
    }

    #[test]
    fn test_first_mention_wins() {
        let body = "@draftcheck frobnicate\n@draftcheck review";
        assert_eq!(
            parse_comment(body),
            ParseResult::UnrecognizedCommand {
                attempted: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn test_mention_on_later_line() {
        let body = "Thanks for the draft!\n\n@draftcheck review";
        assert_eq!(
            parse_comment(body),
            ParseResult::Command(BotCommand::Review(ReviewOptions::default()))
        );
    }

    #[test]
    fn test_command_display() {
        let cmd = BotCommand::Review(ReviewOptions {
            file: Some("a.md".to_string()),
        });
        assert_eq!(cmd.to_string(), "review file:a.md");
    }
}
