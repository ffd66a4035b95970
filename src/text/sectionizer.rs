//! Splits a text into named sections by literal header search.
//!
//! A section starts at the first occurrence of its registered keyword
//! (e.g. `[PIXEL_SHADER]`) and runs to the start of the next registered
//! section found later in the text. The keyword must not appear anywhere
//! else. Registering the empty name gives a leading section holding
//! everything before the first real header.

/// Locates registered sections within one borrowed text.
pub struct TextSectionizer<'t> {
    text: &'t str,
    sections: Vec<Section>,
}

struct Section {
    name: String,
    start: Option<usize>,
    content_start: usize,
    content_end: usize,
    first_line: u32,
}

impl Section {
    fn reset(&mut self) {
        self.start = None;
        self.content_start = 0;
        self.content_end = 0;
        self.first_line = 0;
    }
}

impl<'t> TextSectionizer<'t> {
    pub fn new() -> Self {
        Self {
            text: "",
            sections: Vec::new(),
        }
    }

    /// Registers a section keyword. Order defines the section indices used
    /// with [`section_content`](Self::section_content).
    pub fn add_section(&mut self, name: &str) {
        self.sections.push(Section {
            name: name.to_string(),
            start: None,
            content_start: 0,
            content_end: 0,
            first_line: 0,
        });
    }

    /// Searches `text` for all registered sections.
    pub fn process(&mut self, text: &'t str) {
        self.text = text;
        for section in &mut self.sections {
            section.reset();
        }

        for section in &mut self.sections {
            if let Some(found) = text.find(&section.name) {
                section.start = Some(found);
                section.content_start = found + section.name.len();
                section.content_end = text.len();
            }
        }

        for first in 0..self.sections.len() {
            let Some(start1) = self.sections[first].start else {
                continue;
            };

            self.sections[first].first_line =
                1 + text[..start1].bytes().filter(|&byte| byte == b'\n').count() as u32;

            for second in 0..self.sections.len() {
                if first == second {
                    continue;
                }
                let Some(start2) = self.sections[second].start else {
                    continue;
                };

                // A later section truncates this one. Two sections may start
                // at offset 0 when the unnamed leading section is registered;
                // the named one wins the content.
                let empty_name = self.sections[first].name.is_empty();
                if start2 > start1 || (start2 == start1 && empty_name) {
                    let section = &mut self.sections[first];
                    section.content_end = section.content_end.min(start2).max(section.content_start);
                }
            }
        }
    }

    /// Content of the section at `index`, empty when the header was not
    /// found.
    pub fn section_content(&self, index: usize) -> &'t str {
        let section = &self.sections[index];
        if section.start.is_none() {
            return "";
        }
        &self.text[section.content_start..section.content_end]
    }

    /// 1-based line number the section's header starts on; 0 when absent.
    pub fn section_first_line(&self, index: usize) -> u32 {
        self.sections[index].first_line
    }
}

impl Default for TextSectionizer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::TextSectionizer;

    fn sectionizer<'t>(names: &[&str], text: &'t str) -> TextSectionizer<'t> {
        let mut sectionizer = TextSectionizer::new();
        for name in names {
            sectionizer.add_section(name);
        }
        sectionizer.process(text);
        sectionizer
    }

    #[test]
    fn splits_in_registration_order() {
        let text = "[ONE]\nfirst\n[TWO]\nsecond\n";
        let sections = sectionizer(&["[ONE]", "[TWO]"], text);

        assert_eq!(sections.section_content(0), "\nfirst\n");
        assert_eq!(sections.section_content(1), "\nsecond\n");
        assert_eq!(sections.section_first_line(0), 1);
        assert_eq!(sections.section_first_line(1), 3);
    }

    #[test]
    fn text_order_beats_registration_order() {
        let text = "[TWO]\nsecond\n[ONE]\nfirst\n";
        let sections = sectionizer(&["[ONE]", "[TWO]"], text);

        assert_eq!(sections.section_content(0), "\nfirst\n");
        assert_eq!(sections.section_content(1), "\nsecond\n");
    }

    #[test]
    fn missing_sections_are_empty() {
        let text = "[ONE]\nfirst\n";
        let sections = sectionizer(&["[ONE]", "[TWO]"], text);

        assert_eq!(sections.section_content(0), "\nfirst\n");
        assert_eq!(sections.section_content(1), "");
        assert_eq!(sections.section_first_line(1), 0);
    }

    #[test]
    fn unnamed_leading_section() {
        let text = "import a\nimport b\n[ONE]\nbody\n";
        let sections = sectionizer(&["", "[ONE]"], text);

        assert_eq!(sections.section_content(0), "import a\nimport b\n");
        assert_eq!(sections.section_content(1), "\nbody\n");
    }

    #[test]
    fn unnamed_section_yields_to_header_at_start() {
        let text = "[ONE]\nbody\n";
        let sections = sectionizer(&["", "[ONE]"], text);

        assert_eq!(sections.section_content(0), "");
        assert_eq!(sections.section_content(1), "\nbody\n");
    }
}
