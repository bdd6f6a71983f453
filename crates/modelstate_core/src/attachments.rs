//! Out-of-band project attachments: preview image and description.
//!
//! Each attachment is its own entity document, referenced from the root
//! descriptor by `(UID, version)`. Attaching a new one replaces the old
//! document; the garbage collector never deletes the referenced one.

use crate::error::{CoreError, CoreResult};
use crate::root::{AttachmentRef, RootDescriptor};
use crate::schema::{entity, model, schema_type, SCHEMA_TYPE};
use crate::types::Uid;
use crate::uid::UidGenerator;
use modelstate_storage::{Document, DocumentStore, Fields, Filter, FindOptions, Update};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Encoding of a preview image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageFormat {
    /// PNG.
    Png,
    /// JPEG.
    Jpeg,
    /// SVG.
    Svg,
}

impl ImageFormat {
    /// Wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Svg => "svg",
        }
    }

    /// Parses a wire tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Markup of a project description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DescriptionSyntax {
    /// Unformatted text.
    PlainText,
    /// Markdown.
    Markdown,
    /// HTML.
    Html,
}

impl DescriptionSyntax {
    /// Wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "PlainText",
            Self::Markdown => "Markdown",
            Self::Html => "Html",
        }
    }

    /// Parses a wire tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "PlainText" => Some(Self::PlainText),
            "Markdown" => Some(Self::Markdown),
            "Html" => Some(Self::Html),
            _ => None,
        }
    }
}

impl fmt::Display for DescriptionSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project preview image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// Image encoding.
    pub format: ImageFormat,
}

/// Project description text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescription {
    /// Description body.
    pub text: String,
    /// Markup of `text`.
    pub syntax: DescriptionSyntax,
}

/// Which attachment slot of the root descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Preview,
    Description,
}

impl Slot {
    const fn schema_type(self) -> &'static str {
        match self {
            Self::Preview => schema_type::PREVIEW_IMAGE,
            Self::Description => schema_type::PROJECT_DESCRIPTION,
        }
    }

    const fn fields(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Preview => (
                model::PREVIEW_IMAGE_UID,
                model::PREVIEW_IMAGE_VERSION,
                model::PREVIEW_IMAGE_TYPE,
            ),
            Self::Description => (
                model::DESCRIPTION_UID,
                model::DESCRIPTION_VERSION,
                model::DESCRIPTION_SYNTAX,
            ),
        }
    }

    fn current(self, root: &RootDescriptor) -> Option<&AttachmentRef> {
        match self {
            Self::Preview => root.preview_image.as_ref(),
            Self::Description => root.description.as_ref(),
        }
    }

    fn set_current(self, root: &mut RootDescriptor, value: Option<AttachmentRef>) {
        match self {
            Self::Preview => root.preview_image = value,
            Self::Description => root.description = value,
        }
    }
}

/// Stores `image` and points the root descriptor at it, replacing any
/// previous preview image.
///
/// # Errors
///
/// Returns an error if a UID cannot be allocated or a write fails.
pub fn attach_preview_image(
    store: &mut dyn DocumentStore,
    uids: &mut dyn UidGenerator,
    root: &mut RootDescriptor,
    image: &PreviewImage,
) -> CoreResult<AttachmentRef> {
    let data = Value::Array(image.data.iter().map(|b| Value::from(*b)).collect());
    attach(store, uids, root, Slot::Preview, data, image.format.as_str())
}

/// Stores `description` and points the root descriptor at it.
///
/// # Errors
///
/// Returns an error if a UID cannot be allocated or a write fails.
pub fn attach_description(
    store: &mut dyn DocumentStore,
    uids: &mut dyn UidGenerator,
    root: &mut RootDescriptor,
    description: &ProjectDescription,
) -> CoreResult<AttachmentRef> {
    let text = Value::String(description.text.clone());
    attach(store, uids, root, Slot::Description, text, description.syntax.as_str())
}

/// Drops the preview image. Returns whether one was attached.
///
/// # Errors
///
/// Returns an error if a write fails.
pub fn remove_preview_image(store: &mut dyn DocumentStore, root: &mut RootDescriptor) -> CoreResult<bool> {
    detach(store, root, Slot::Preview)
}

/// Drops the project description. Returns whether one was attached.
///
/// # Errors
///
/// Returns an error if a write fails.
pub fn remove_description(store: &mut dyn DocumentStore, root: &mut RootDescriptor) -> CoreResult<bool> {
    detach(store, root, Slot::Description)
}

/// Reads the attached preview image.
///
/// A reference to a missing or malformed document is logged and reported
/// as no image.
///
/// # Errors
///
/// Returns an error only if the store cannot be read.
pub fn read_preview_image(store: &dyn DocumentStore, root: &RootDescriptor) -> CoreResult<Option<PreviewImage>> {
    let Some(reference) = root.preview_image.as_ref() else {
        return Ok(None);
    };
    let decoded = fetch(store, Slot::Preview, reference).and_then(|doc| decode_image(&doc, reference));
    tolerate_inconsistent(decoded)
}

/// Reads the attached project description, with the same tolerance as
/// [`read_preview_image`].
///
/// # Errors
///
/// Returns an error only if the store cannot be read.
pub fn read_description(store: &dyn DocumentStore, root: &RootDescriptor) -> CoreResult<Option<ProjectDescription>> {
    let Some(reference) = root.description.as_ref() else {
        return Ok(None);
    };
    let decoded = fetch(store, Slot::Description, reference).and_then(|doc| decode_description(&doc, reference));
    tolerate_inconsistent(decoded)
}

/// Reads a project's preview image without opening the project.
///
/// # Errors
///
/// Returns an error only if the store cannot be read.
pub fn read_project_preview_image(store: &dyn DocumentStore) -> CoreResult<Option<PreviewImage>> {
    match RootDescriptor::load(store)? {
        Some(root) => read_preview_image(store, &root),
        None => Ok(None),
    }
}

fn attach(
    store: &mut dyn DocumentStore,
    uids: &mut dyn UidGenerator,
    root: &mut RootDescriptor,
    slot: Slot,
    data: Value,
    tag: &str,
) -> CoreResult<AttachmentRef> {
    let reference = AttachmentRef {
        uid: uids.next_uid()?,
        version: uids.next_uid()?,
        tag: tag.to_string(),
    };

    let mut fields = Fields::new();
    fields.insert(SCHEMA_TYPE.into(), slot.schema_type().into());
    fields.insert(entity::ENTITY_ID.into(), reference.uid.to_wire().into());
    fields.insert(entity::VERSION.into(), reference.version.to_wire().into());
    fields.insert(entity::DATA.into(), data);
    fields.insert(entity::FORMAT.into(), tag.into());
    store.insert(fields)?;

    let (uid_field, version_field, tag_field) = slot.fields();
    root.update(
        store,
        &Update::set(uid_field, reference.uid.to_wire())
            .and_set(version_field, reference.version.to_wire())
            .and_set(tag_field, tag),
    )?;

    if let Some(previous) = slot.current(root).cloned() {
        delete_document(store, slot, &previous)?;
    }
    slot.set_current(root, Some(reference.clone()));

    tracing::info!(
        kind = slot.schema_type(),
        entity = %reference.uid,
        version = %reference.version,
        "attached"
    );
    Ok(reference)
}

fn detach(store: &mut dyn DocumentStore, root: &mut RootDescriptor, slot: Slot) -> CoreResult<bool> {
    let Some(previous) = slot.current(root).cloned() else {
        return Ok(false);
    };
    let (uid_field, version_field, tag_field) = slot.fields();
    root.update(
        store,
        &Update::set(uid_field, 0).and_set(version_field, 0).and_set(tag_field, ""),
    )?;
    delete_document(store, slot, &previous)?;
    slot.set_current(root, None);

    tracing::info!(kind = slot.schema_type(), entity = %previous.uid, "detached");
    Ok(true)
}

fn reference_filter(slot: Slot, reference: &AttachmentRef) -> Filter {
    Filter::eq(SCHEMA_TYPE, slot.schema_type())
        .and(Filter::eq(entity::ENTITY_ID, reference.uid.to_wire()))
        .and(Filter::eq(entity::VERSION, reference.version.to_wire()))
}

fn delete_document(store: &mut dyn DocumentStore, slot: Slot, reference: &AttachmentRef) -> CoreResult<()> {
    store.delete_many(&reference_filter(slot, reference))?;
    Ok(())
}

fn fetch(store: &dyn DocumentStore, slot: Slot, reference: &AttachmentRef) -> CoreResult<Document> {
    store
        .find_one(&reference_filter(slot, reference), &FindOptions::new())?
        .ok_or_else(|| {
            CoreError::inconsistent_reference(format!(
                "{} {}/{} referenced by the root descriptor is missing",
                slot.schema_type(),
                reference.uid,
                reference.version
            ))
        })
}

fn decode_image(doc: &Document, reference: &AttachmentRef) -> CoreResult<PreviewImage> {
    let malformed = || CoreError::inconsistent_reference(format!("preview image {} is malformed", reference.uid));
    let data = doc
        .get_array(entity::DATA)
        .ok_or_else(malformed)?
        .iter()
        .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(malformed)?;
    let format = doc
        .get_str(entity::FORMAT)
        .and_then(ImageFormat::parse)
        .ok_or_else(malformed)?;
    Ok(PreviewImage { data, format })
}

fn decode_description(doc: &Document, reference: &AttachmentRef) -> CoreResult<ProjectDescription> {
    let malformed = || CoreError::inconsistent_reference(format!("description {} is malformed", reference.uid));
    let text = doc.get_str(entity::DATA).ok_or_else(malformed)?.to_string();
    let syntax = doc
        .get_str(entity::FORMAT)
        .and_then(DescriptionSyntax::parse)
        .ok_or_else(malformed)?;
    Ok(ProjectDescription { text, syntax })
}

fn tolerate_inconsistent<T>(result: CoreResult<T>) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err @ CoreError::InconsistentReference { .. }) => {
            tracing::warn!(error = %err, "ignoring dangling attachment reference");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Entity documents the garbage collector must keep.
#[must_use]
pub fn protected_references(root: &RootDescriptor) -> Vec<(Uid, Uid)> {
    [root.preview_image.as_ref(), root.description.as_ref()]
        .into_iter()
        .flatten()
        .map(|r| (r.uid, r.version))
        .collect()
}
