//! Reply segmentation for human-paced sending
//!
//! A reply goes out as several short messages instead of one block, the
//! way a person types. Splits happen on sentence-ending punctuation
//! (CJK and ASCII), newlines, and tildes. An ASCII period followed by a
//! digit is part of a number or dotted date (`-6.0`, `2024.5.1`) and
//! never ends a segment.

/// Sentence terminators besides the ASCII period
const TERMINATORS: &[char] = &['。', '！', '？', '…', '!', '?', '\n', '~', '～'];

fn is_terminal(chars: &[char], i: usize) -> bool {
    let c = chars[i];
    if c == '.' {
        return !chars.get(i + 1).is_some_and(char::is_ascii_digit);
    }
    TERMINATORS.contains(&c)
}

/// Split `text` into natural utterance chunks.
///
/// Each segment keeps its trailing punctuation run; surrounding
/// whitespace is trimmed and empty segments are dropped, so a reply
/// that is all whitespace yields no segments.
#[must_use]
pub fn split_segments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        current.push(chars[i]);
        if is_terminal(&chars, i) {
            // Absorb the rest of a punctuation run ("？！", "……")
            while i + 1 < chars.len() && is_terminal(&chars, i + 1) {
                i += 1;
                current.push(chars[i]);
            }
            flush(&mut current, &mut segments);
        }
        i += 1;
    }
    flush(&mut current, &mut segments);

    segments
}

fn flush(current: &mut String, segments: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_cjk_punctuation() {
        let segments = split_segments("你好。今天是2024.5.1号！天气不错~");
        assert_eq!(segments, vec!["你好。", "今天是2024.5.1号！", "天气不错~"]);
    }

    #[test]
    fn period_before_digit_is_not_terminal() {
        let segments = split_segments("温度是-6.0度。冷！");
        assert_eq!(segments, vec!["温度是-6.0度。", "冷！"]);
    }

    #[test]
    fn period_before_letter_is_terminal() {
        let segments = split_segments("Sure. Sounds good.");
        assert_eq!(segments, vec!["Sure.", "Sounds good."]);
    }

    #[test]
    fn newlines_split_and_trim() {
        let segments = split_segments("first line\nsecond line");
        assert_eq!(segments, vec!["first line", "second line"]);
    }

    #[test]
    fn punctuation_runs_stay_with_their_segment() {
        let segments = split_segments("really?!ok……fine");
        assert_eq!(segments, vec!["really?!", "ok……", "fine"]);
    }

    #[test]
    fn unterminated_tail_is_kept() {
        let segments = split_segments("no punctuation at all");
        assert_eq!(segments, vec!["no punctuation at all"]);
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        assert!(split_segments("  \n \n ").is_empty());
        assert!(split_segments("").is_empty());
    }
}
