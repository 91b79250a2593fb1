use serde::{Deserialize, Serialize};

/// MIME type Google Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Display colour applied to folders created by the sync engine
pub const FOLDER_COLOR_RGB: &str = "#00FF00";

/// Fields requested for every file resource
pub const FILE_FIELDS: &str = "id,name,mimeType,parents,createdTime,trashed";

/// DriveFile: file resource as returned by the Drive v3 API
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Response of `files.list`
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

/// Metadata body for folder creation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFolder<'a> {
    pub name: &'a str,
    pub mime_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<&'a str>,
    pub folder_color_rgb: &'static str,
}

/// Metadata part of a multipart file upload
#[derive(Debug, Serialize)]
pub struct NewFile<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Folder,
}

/// Remote object as seen by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectReference {
    pub id: String,
    pub name: String,
    /// `None` means the object sits at the store root
    pub parent_id: Option<String>,
    pub kind: ObjectKind,
}

impl From<DriveFile> for RemoteObjectReference {
    fn from(file: DriveFile) -> Self {
        let kind = if file.is_folder() {
            ObjectKind::Folder
        } else {
            ObjectKind::File
        };
        Self {
            id: file.id,
            name: file.name,
            parent_id: file.parents.into_iter().next(),
            kind,
        }
    }
}
