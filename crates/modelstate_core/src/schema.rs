//! Wire names of persisted documents.
//!
//! These strings are part of the on-disk format and must not change.

/// Discriminator field present on every document the core writes.
pub const SCHEMA_TYPE: &str = "SchemaType";

/// `SchemaType` values.
pub mod schema_type {
    /// The per-project root descriptor.
    pub const MODEL: &str = "Model";
    /// Main document of a committed version.
    pub const MODEL_STATE: &str = "ModelState";
    /// Continuation of an oversized absolute version.
    pub const MODEL_STATE_EXTENSION: &str = "ModelStateExtension";
    /// Pre-upgrade label of a version document that was not current.
    pub const MODEL_STATE_INACTIVE: &str = "ModelStateInactive";
    /// Pre-upgrade label of an extension document that was not current.
    pub const MODEL_STATE_EXTENSION_INACTIVE: &str = "ModelStateExtensionInactive";
    /// Project preview image.
    pub const PREVIEW_IMAGE: &str = "PreviewImage";
    /// Project description text.
    pub const PROJECT_DESCRIPTION: &str = "ProjectDescription";

    /// Every type that marks a committed (or once committed) version.
    pub const VERSION_DOCUMENTS: [&str; 4] = [
        MODEL_STATE,
        MODEL_STATE_EXTENSION,
        MODEL_STATE_INACTIVE,
        MODEL_STATE_EXTENSION_INACTIVE,
    ];
}

/// Version document fields.
pub mod state {
    /// Schema version of main documents.
    pub const SCHEMA_VERSION: &str = "SchemaVersion_ModelState";
    /// Schema version of extension documents.
    pub const EXTENSION_SCHEMA_VERSION: &str = "SchemaVersion_ModelStateExtension";
    /// Current value of both schema versions.
    pub const CURRENT_SCHEMA_VERSION: i32 = 1;
    /// Version name.
    pub const VERSION: &str = "Version";
    /// Name of the version this one was saved on top of.
    pub const PARENT_VERSION: &str = "ParentVersion";
    /// `absolute` or `relative`.
    pub const TYPE: &str = "Type";
    /// Whether extension documents follow.
    pub const EXTENSION: &str = "Extension";
    /// Absolute version a relative one is based on.
    pub const BASE_STATE: &str = "BaseState";
    /// Save comment.
    pub const DESCRIPTION: &str = "Description";
    /// User label.
    pub const LABEL: &str = "Label";
    /// `Type` of a full snapshot.
    pub const TYPE_ABSOLUTE: &str = "absolute";
    /// `Type` of a delta.
    pub const TYPE_RELATIVE: &str = "relative";

    /// Suffix of the added-or-modified id column.
    pub const ADD_EDIT_ID: &str = "AddEdit_Id";
    /// Suffix of the added-or-modified parent column.
    pub const ADD_EDIT_PARENT: &str = "AddEdit_Parent";
    /// Suffix of the added-or-modified version column.
    pub const ADD_EDIT_VERSION: &str = "AddEdit_Version";
    /// Suffix of the removed id column.
    pub const DEL_ID: &str = "Del_Id";
}

/// Root descriptor fields.
pub mod model {
    /// Schema version of the root descriptor.
    pub const SCHEMA_VERSION: &str = "SchemaVersion_Model";
    /// Schema version written by this crate.
    pub const CURRENT_SCHEMA_VERSION: i64 = 2;
    /// Entity id of the descriptor itself.
    pub const ENTITY_ID: &str = "EntityID";
    /// Entity version of the descriptor itself.
    pub const VERSION: &str = "Version";
    /// Kind of model held by the project.
    pub const MODEL_TYPE: &str = "ModelType";
    /// Default `ModelType`.
    pub const DEFAULT_MODEL_TYPE: &str = "Parametric3D";
    /// Active branch name.
    pub const ACTIVE_BRANCH: &str = "ActiveBranch";
    /// Active version name.
    pub const ACTIVE_VERSION: &str = "ActiveVersion";
    /// Preview image entity id.
    pub const PREVIEW_IMAGE_UID: &str = "PreviewImageUID";
    /// Preview image entity version.
    pub const PREVIEW_IMAGE_VERSION: &str = "PreviewImageVersion";
    /// Preview image format.
    pub const PREVIEW_IMAGE_TYPE: &str = "PreviewImageType";
    /// Description entity id.
    pub const DESCRIPTION_UID: &str = "DescriptionUID";
    /// Description entity version.
    pub const DESCRIPTION_VERSION: &str = "DescriptionVersion";
    /// Description markup syntax.
    pub const DESCRIPTION_SYNTAX: &str = "DescriptionSyntax";
}

/// Fields shared by entity documents.
pub mod entity {
    /// Entity id.
    pub const ENTITY_ID: &str = "EntityID";
    /// Entity version.
    pub const VERSION: &str = "Version";
    /// Attachment payload.
    pub const DATA: &str = "Data";
    /// Attachment format or syntax tag.
    pub const FORMAT: &str = "Format";
}

/// Name of an array column, e.g. `topoAddEdit_Id`.
#[must_use]
pub fn column(kind: crate::types::EntityKind, suffix: &str) -> String {
    format!("{}{suffix}", kind.column_prefix())
}
