//! Contract document rendering
//!
//! Rendering happens in two steps. [`layout`] turns a contract into an
//! ordered list of blocks; it is a pure function of the contract, the optional
//! images and the render date. A backend then draws the blocks: [`pdf`]
//! produces the stored document, [`text`] a plain-text preview.
//!
//! The renderer never writes the final `contract-{id}.pdf` directly. It
//! writes a staging file next to it and hands back a [`StagedDocument`]; the
//! caller commits it once the matching database write succeeded, and a
//! dropped stage deletes itself.

pub mod pdf;
pub mod text;

use chrono::{Local, NaiveDate};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::contract::{Contract, PRICE_SCALE};
use crate::{CoreError, CoreResult};

pub const TITLE: &str = "Contract Details";
pub const CONTRACT_SECTION: &str = "Contract Information";
pub const AGENT_SECTION: &str = "Agent Information";
pub const CLIENT_SECTION: &str = "Client Information";
pub const DESCRIPTION_SECTION: &str = "Description";
pub const SIGNATURE_SECTION: &str = "Client Signature";

/// Currency appended to every price.
pub const CURRENCY: &str = "TND";

/// Width of the embedded signature, in points.
pub const SIGNATURE_WIDTH_PT: f32 = 200.0;

/// Width of the letterhead logo, in points.
pub const LOGO_WIDTH_PT: f32 = 120.0;

/// One drawable element of a contract document.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Letterhead { logo: PathBuf, title: String },
    Heading(String),
    Field { label: String, value: String },
    Paragraph(String),
    /// Sub-heading introducing the signature image.
    Caption(String),
    Image { path: PathBuf, width_pt: f32 },
    Stamp(String),
    /// Vertical space, in text lines.
    Gap(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl DocumentLayout {
    pub fn has_heading(&self, heading: &str) -> bool {
        self.blocks.iter().any(|b| match b {
            Block::Heading(h) | Block::Caption(h) => h == heading,
            Block::Letterhead { title, .. } => title == heading,
            _ => false,
        })
    }

    pub fn field(&self, label: &str) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            Block::Field { label: l, value } if l == label => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &Path> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Image { path, .. } => Some(path.as_path()),
            Block::Letterhead { logo, .. } => Some(logo.as_path()),
            _ => None,
        })
    }
}

fn field(label: &str, value: impl Into<String>) -> Block {
    let value = value.into();
    Block::Field {
        label: label.to_string(),
        value: if value.trim().is_empty() {
            "N/A".to_string()
        } else {
            value
        },
    }
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Lay out `contract` in the fixed section order.
///
/// The letterhead appears only when `logo` exists on disk, the client section
/// only when the contract carries a client name, and the signature section
/// only when `signature` exists on disk. `rendered_on` is the date printed in
/// the signature stamp.
pub fn layout(
    contract: &Contract,
    signature: Option<&Path>,
    logo: Option<&Path>,
    rendered_on: NaiveDate,
) -> DocumentLayout {
    let mut blocks = Vec::new();

    if let Some(logo) = logo.filter(|p| p.is_file()) {
        blocks.push(Block::Letterhead {
            logo: logo.to_path_buf(),
            title: TITLE.to_string(),
        });
    }

    blocks.push(Block::Heading(CONTRACT_SECTION.to_string()));
    blocks.push(field("Type", contract.contract_type.as_str()));
    blocks.push(field("Duration", contract.duration.as_str()));
    let mut price = contract.price;
    price.rescale(PRICE_SCALE);
    blocks.push(field("Prix", format!("{} {}", price, CURRENCY)));
    blocks.push(Block::Gap(1));

    blocks.push(Block::Heading(AGENT_SECTION.to_string()));
    blocks.push(field("Agent Name", contract.agent_name.as_str()));
    blocks.push(field("Email Assurance", contract.agent_email.as_str()));
    blocks.push(field("Adresse Assurance", contract.agent_address.as_str()));
    blocks.push(Block::Gap(1));

    if contract.has_client() {
        blocks.push(Block::Heading(CLIENT_SECTION.to_string()));
        blocks.push(field("Client Name", optional(&contract.client_user_name)));
        blocks.push(field("Client Email", optional(&contract.client_email)));
        blocks.push(field("Client Phone", optional(&contract.client_phone)));
        blocks.push(Block::Gap(1));
    }

    blocks.push(Block::Heading(DESCRIPTION_SECTION.to_string()));
    blocks.push(Block::Paragraph(if contract.description.trim().is_empty() {
        "N/A".to_string()
    } else {
        contract.description.clone()
    }));

    if let Some(signature) = signature.filter(|p| p.is_file()) {
        blocks.push(Block::Gap(4));
        blocks.push(Block::Caption(SIGNATURE_SECTION.to_string()));
        blocks.push(Block::Image {
            path: signature.to_path_buf(),
            width_pt: SIGNATURE_WIDTH_PT,
        });
        blocks.push(Block::Gap(1));
        blocks.push(Block::Stamp(format!(
            "Signed on: {}",
            rendered_on.format("%d/%m/%Y")
        )));
    }

    DocumentLayout {
        title: format!("Contract {}", contract.id),
        blocks,
    }
}

/// File name of the stored document for contract `id`.
pub fn document_name(id: Uuid) -> String {
    format!("contract-{}.pdf", id)
}

/// A rendered document waiting to be moved to its final path.
#[derive(Debug)]
pub struct StagedDocument {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedDocument {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn file_name(&self) -> String {
        self.target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn staged_path(&self) -> &Path {
        self.file.path()
    }

    /// Atomically replace the final document with the staged one.
    pub fn commit(self) -> CoreResult<PathBuf> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| CoreError::Io(e.error))?;
        tracing::debug!("Committed document {}", target.display());
        Ok(target)
    }
}

/// Writes contract documents into one output directory.
#[derive(Debug, Clone)]
pub struct Renderer {
    output_dir: PathBuf,
    logo: Option<PathBuf>,
}

impl Renderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            logo: None,
        }
    }

    /// Use `logo` as the letterhead image when it exists.
    pub fn with_logo(mut self, logo: Option<PathBuf>) -> Self {
        self.logo = logo;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn layout(&self, contract: &Contract, signature: Option<&Path>) -> DocumentLayout {
        layout(
            contract,
            signature,
            self.logo.as_deref(),
            Local::now().date_naive(),
        )
    }

    /// Render `contract` into a staging file. Blocking; async callers should
    /// run it on the blocking pool.
    pub fn render(&self, contract: &Contract, signature: Option<&Path>) -> CoreResult<StagedDocument> {
        let layout = self.layout(contract, signature);
        let target = self.output_dir.join(document_name(contract.id));

        let mut file = tempfile::Builder::new()
            .prefix(".contract-")
            .suffix(".pdf.part")
            .tempfile_in(&self.output_dir)?;

        pdf::write(&layout, file.as_file_mut())?;
        file.as_file_mut().flush()?;
        file.as_file().sync_all()?;

        tracing::info!(
            "Rendered contract {} ({} blocks) to staging file {}",
            contract.id,
            layout.blocks.len(),
            file.path().display()
        );

        Ok(StagedDocument { file, target })
    }
}
