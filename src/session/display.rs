use vte::{Parser as VteParser, Perform};

/// Collapse every CRLF pair into a single LF.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Prepare device text for the output pane: CRLF becomes LF, escape sequences and
/// other control bytes are dropped, tabs and newlines survive.
pub fn clean_display_text(text: &str) -> String {
    struct PaneText {
        output: String,
    }

    impl Perform for PaneText {
        fn print(&mut self, c: char) {
            self.output.push(c);
        }

        fn execute(&mut self, byte: u8) {
            match byte {
                b'\n' | b'\t' => self.output.push(byte as char),
                _ => {}
            }
        }
    }

    let normalized = normalize_newlines(text);
    let mut parser = VteParser::new();
    let mut pane = PaneText {
        output: String::with_capacity(normalized.len()),
    };
    parser.advance(&mut pane, normalized.as_bytes());
    pane.output
}
