// src/cli/input.rs
/// Single-line text editor used by the search box, inline budget edits and
/// the small forms.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct LineEdit {
    pub value: String,
    pub cursor: usize, // byte offset, always on a char boundary
    pub numeric: bool,
}

impl LineEdit {
    pub fn numeric() -> Self {
        Self { numeric: true, ..Self::default() }
    }

    pub fn with_value(value: impl Into<String>, numeric: bool) -> Self {
        let mut edit = Self { numeric, ..Self::default() };
        edit.set(value);
        edit
    }

    pub fn set(&mut self, s: impl Into<String>) {
        self.value = s.into();
        self.cursor = self.value.len();
    }

    pub fn accepts(&self, ch: char) -> bool {
        !self.numeric || ch.is_ascii_digit() || ch == '.' || ch == '-'
    }

    pub fn push(&mut self, ch: char) {
        if !self.accepts(ch) {
            return;
        }
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub fn backspace(&mut self) {
        if let Some((idx, _)) = self.value[..self.cursor].char_indices().next_back() {
            self.value.remove(idx);
            self.cursor = idx;
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.len() {
            self.value.remove(self.cursor);
        }
    }

    pub fn left(&mut self) {
        if let Some((idx, _)) = self.value[..self.cursor].char_indices().next_back() {
            self.cursor = idx;
        }
    }

    pub fn right(&mut self) {
        if let Some(ch) = self.value[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    pub fn trimmed(&self) -> &str {
        self.value.trim()
    }

    /// Value with a block cursor marker, for display.
    pub fn rendered(&self) -> String {
        let (head, tail) = self.value.split_at(self.cursor);
        format!("{head}▏{tail}")
    }
}
