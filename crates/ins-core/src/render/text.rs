//! Plain-text preview of a contract document

use super::{Block, DocumentLayout};

pub fn generate(layout: &DocumentLayout) -> String {
    let mut output = String::new();

    for block in &layout.blocks {
        match block {
            Block::Letterhead { logo, title } => {
                output.push_str(&format!("[logo: {}]\n", logo.display()));
                output.push_str(&format!("# {}\n\n", title));
            }
            Block::Heading(text) => {
                output.push_str(&format!("## {}\n", text));
                output.push_str(&format!("{}\n", "-".repeat(text.chars().count() + 3)));
            }
            Block::Field { label, value } => {
                output.push_str(&format!("{}: {}\n", label, value));
            }
            Block::Paragraph(text) => {
                output.push_str(&format!("    {}\n", text));
            }
            Block::Caption(text) => {
                output.push_str(&format!("{}:\n", text));
            }
            Block::Image { path, width_pt } => {
                output.push_str(&format!("[image: {} @ {}pt]\n", path.display(), width_pt));
            }
            Block::Stamp(text) => {
                output.push_str(text);
                output.push('\n');
            }
            Block::Gap(lines) => {
                for _ in 0..*lines {
                    output.push('\n');
                }
            }
        }
    }

    output
}
