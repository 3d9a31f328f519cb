use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use reqwest::Method;
use reqwest::blocking::multipart::{Form, Part};
use serde_json::Value;

use crate::client::{Body, HydroShare, require};
use crate::download::ByteStream;
use crate::error::{Error, Result, Scope};
use crate::pages::Pages;
use crate::query::ResourceFilter;

/// Sharing flags settable through the `flag` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    MakePublic,
    MakePrivate,
    MakeDiscoverable,
    MakeNotDiscoverable,
    MakeShareable,
    MakeNotShareable,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::MakePublic => "make_public",
            Flag::MakePrivate => "make_private",
            Flag::MakeDiscoverable => "make_discoverable",
            Flag::MakeNotDiscoverable => "make_not_discoverable",
            Flag::MakeShareable => "make_shareable",
            Flag::MakeNotShareable => "make_not_shareable",
        }
    }
}

#[derive(Debug, Clone)]
enum UploadSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A file to upload, from disk or from memory.
#[derive(Debug, Clone)]
pub struct UploadFile {
    source: UploadSource,
    name: String,
    folder: Option<String>,
}

impl UploadFile {
    /// Uploads the file at `path` under its own file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::Argument(format!(
                "{} is not a file or is not readable",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Argument(format!("{} has no file name", path.display())))?;
        Ok(Self {
            source: UploadSource::Path(path),
            name,
            folder: None,
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source: UploadSource::Bytes(bytes),
            name: name.into(),
            folder: None,
        }
    }

    /// Name the file gets on the server.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Folder inside the resource to upload into.
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn part(&self) -> Result<Part> {
        require("file name", &self.name)?;
        let mime = mime_guess::from_path(&self.name).first_or_octet_stream();

        let part = match &self.source {
            UploadSource::Path(path) => {
                let file = File::open(path).map_err(|e| Error::io(path, e))?;
                let len = file.metadata().map_err(|e| Error::io(path, e))?.len();
                Part::reader_with_length(file, len)
            }
            UploadSource::Bytes(bytes) => Part::bytes(bytes.clone()),
        };

        part.file_name(self.name.clone())
            .mime_str(mime.essence_str())
            .map_err(|e| Error::Argument(format!("invalid mime type {mime}: {e}")))
    }
}

/// Parameters of [`HydroShare::create_resource`].
#[derive(Debug, Clone, Default)]
pub struct NewResource {
    pub resource_type: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
    /// JSON-encoded science metadata elements, passed through to the server.
    pub metadata: Option<String>,
    /// Custom key/value metadata.
    pub extra_metadata: BTreeMap<String, String>,
    pub edit_users: Vec<String>,
    pub view_users: Vec<String>,
    pub edit_groups: Vec<String>,
    pub view_groups: Vec<String>,
    pub file: Option<UploadFile>,
}

impl NewResource {
    pub fn new(resource_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    fn form(&self) -> Result<Form> {
        let mut form = Form::new()
            .text("resource_type", self.resource_type.clone())
            .text("title", self.title.clone());

        if let Some(a) = self.abstract_text.as_ref().filter(|a| !a.is_empty()) {
            form = form.text("abstract", a.clone());
        }
        for (i, kw) in self.keywords.iter().enumerate() {
            form = form.text(format!("keywords[{i}]"), kw.clone());
        }
        if let Some(m) = self.metadata.as_ref().filter(|m| !m.is_empty()) {
            form = form.text("metadata", m.clone());
        }
        if !self.extra_metadata.is_empty() {
            let extra = serde_json::to_string(&self.extra_metadata).map_err(|e| {
                Error::Argument(format!("extra metadata is not serializable: {e}"))
            })?;
            form = form.text("extra_metadata", extra);
        }
        for (field, names) in [
            ("edit_users", &self.edit_users),
            ("view_users", &self.view_users),
            ("edit_groups", &self.edit_groups),
            ("view_groups", &self.view_groups),
        ] {
            if !names.is_empty() {
                form = form.text(field, names.join(","));
            }
        }
        if let Some(file) = &self.file {
            form = form.part("file", file.part()?);
        }
        Ok(form)
    }
}

impl HydroShare {
    /// Resources matching `filter`, fetched page by page.
    pub fn get_resource_list(&self, filter: &ResourceFilter) -> Result<Pages<'_>> {
        filter.validate()?;
        let mut url = self.endpoint(&["resource"], true)?;
        let pairs = filter.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(Pages::new(self, url, None))
    }

    pub fn get_system_metadata(&self, pid: &str) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "sysmeta"], true)?;
        self.json(Method::GET, url, Body::Empty, Scope::resource(pid))
    }

    /// Science metadata elements as JSON.
    pub fn get_science_metadata(&self, pid: &str) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "scimeta", "elements"], true)?;
        self.json(Method::GET, url, Body::Empty, Scope::resource(pid))
    }

    /// Replaces science metadata elements; the server validates the payload.
    pub fn update_science_metadata(&self, pid: &str, metadata: &Value) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "scimeta", "elements"], true)?;
        self.json(Method::PUT, url, Body::Json(metadata), Scope::resource(pid))
    }

    /// Science metadata as RDF/XML.
    pub fn get_science_metadata_rdf(&self, pid: &str) -> Result<String> {
        require("pid", pid)?;
        let url = self.endpoint(&["scimeta", pid], true)?;
        self.text(url, Scope::resource(pid))
    }

    /// Stores custom key/value science metadata, e.g. `{"weather": "sunny"}`.
    pub fn set_custom_science_metadata(
        &self,
        pid: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "scimeta", "custom"], true)?;
        let fields: Vec<_> = metadata.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        self.json(Method::POST, url, Body::Form(fields), Scope::resource(pid))
    }

    /// OAI-ORE resource map as XML.
    pub fn get_resource_map(&self, pid: &str) -> Result<String> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "map"], true)?;
        self.text(url, Scope::resource(pid))
    }

    /// Creates a resource and returns its id.
    ///
    /// The resource type is checked against [`HydroShare::get_resource_types`] first.
    pub fn create_resource(&self, resource: &NewResource) -> Result<String> {
        require("resource_type", &resource.resource_type)?;
        require("title", &resource.title)?;

        let known = self.cached_resource_types()?;
        if !known.contains(&resource.resource_type) {
            return Err(Error::Argument(format!(
                "resource type {} is not among known resources: {}",
                resource.resource_type,
                known.iter().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        let url = self.endpoint(&["resource"], true)?;
        let reply: Value =
            self.json(Method::POST, url.clone(), Body::Multipart(resource.form()?), Scope::NONE)?;
        resource_id(&reply).ok_or_else(|| Error::Protocol {
            url: url.to_string(),
            message: "response did not include resource_id".into(),
        })
    }

    /// Deletes a resource, returning its id.
    pub fn delete_resource(&self, pid: &str) -> Result<String> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid], true)?;
        let reply: Value = self.json(Method::DELETE, url, Body::Empty, Scope::resource(pid))?;
        Ok(resource_id(&reply).unwrap_or_else(|| pid.to_string()))
    }

    pub fn get_access_rules(&self, pid: &str) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "access"], true)?;
        self.json(Method::GET, url, Body::Empty, Scope::resource(pid))
    }

    /// Makes a resource public or private.
    pub fn set_access_rules(&self, pid: &str, public: bool) -> Result<String> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", "accessRules", pid], true)?;
        let form = vec![("public", public.to_string())];
        let reply: Value = self.json(Method::PUT, url, Body::Form(form), Scope::resource(pid))?;
        Ok(resource_id(&reply).unwrap_or_else(|| pid.to_string()))
    }

    pub fn set_flag(&self, pid: &str, flag: Flag) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "flag"], true)?;
        let form = vec![("t", flag.as_str().to_string())];
        self.json(Method::POST, url, Body::Form(form), Scope::resource(pid))
    }

    pub fn set_public(&self, pid: &str, public: bool) -> Result<Value> {
        self.set_flag(pid, if public { Flag::MakePublic } else { Flag::MakePrivate })
    }

    pub fn set_discoverable(&self, pid: &str, discoverable: bool) -> Result<Value> {
        let flag = if discoverable {
            Flag::MakeDiscoverable
        } else {
            Flag::MakeNotDiscoverable
        };
        self.set_flag(pid, flag)
    }

    pub fn set_shareable(&self, pid: &str, shareable: bool) -> Result<Value> {
        let flag = if shareable {
            Flag::MakeShareable
        } else {
            Flag::MakeNotShareable
        };
        self.set_flag(pid, flag)
    }

    pub fn copy_resource(&self, pid: &str) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "copy"], true)?;
        self.json(Method::POST, url, Body::Empty, Scope::resource(pid))
    }

    pub fn create_new_version(&self, pid: &str) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "version"], true)?;
        self.json(Method::POST, url, Body::Empty, Scope::resource(pid))
    }

    /// Files of a resource (url, size, content type), fetched page by page.
    pub fn get_resource_file_list(&self, pid: &str) -> Result<Pages<'_>> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "files"], true)?;
        Ok(Pages::new(self, url, Some(pid)))
    }

    /// Uploads a file into a resource.
    pub fn add_resource_file(&self, pid: &str, file: &UploadFile) -> Result<Value> {
        require("pid", pid)?;
        let url = self.endpoint(&["resource", pid, "files"], true)?;
        let mut form = Form::new().part("file", file.part()?);
        if let Some(folder) = file.folder.as_ref().filter(|f| !f.is_empty()) {
            form = form.text("folder", folder.clone());
        }
        self.json(Method::POST, url, Body::Multipart(form), Scope::resource(pid))
    }

    /// Streams the content of a resource file.
    pub fn get_resource_file_stream(&self, pid: &str, filename: &str) -> Result<ByteStream> {
        require("pid", pid)?;
        require("filename", filename)?;
        let url = self.endpoint(&["resource", pid, "files", filename], false)?;
        let resp = self.execute(Method::GET, url, Body::Empty, Scope::file(pid, filename))?;
        Ok(ByteStream::from_response(resp, self.progress()))
    }

    /// Downloads a resource file into `destination`, which must be an existing directory.
    pub fn get_resource_file(
        &self,
        pid: &str,
        filename: &str,
        destination: &Path,
    ) -> Result<PathBuf> {
        ensure_dir(destination)?;
        let stream = self.get_resource_file_stream(pid, filename)?;
        let name = filename.rsplit('/').next().unwrap_or(filename);
        stream.save(&destination.join(name))
    }

    pub fn delete_resource_file(&self, pid: &str, filename: &str) -> Result<String> {
        require("pid", pid)?;
        require("filename", filename)?;
        let url = self.endpoint(&["resource", pid, "files", filename], false)?;
        let reply: Value =
            self.json(Method::DELETE, url, Body::Empty, Scope::file(pid, filename))?;
        Ok(resource_id(&reply).unwrap_or_else(|| pid.to_string()))
    }

    /// Metadata of a single file (title, keywords, coverage, extra metadata).
    pub fn get_file_metadata(&self, pid: &str, file_id: &str) -> Result<Value> {
        require("pid", pid)?;
        require("file_id", file_id)?;
        let url = self.endpoint(&["resource", pid, "files", file_id, "metadata"], true)?;
        self.json(Method::GET, url, Body::Empty, Scope::file(pid, file_id))
    }

    pub fn update_file_metadata(&self, pid: &str, file_id: &str, metadata: &Value) -> Result<Value> {
        require("pid", pid)?;
        require("file_id", file_id)?;
        let url = self.endpoint(&["resource", pid, "files", file_id, "metadata"], true)?;
        self.json(Method::PUT, url, Body::Json(metadata), Scope::file(pid, file_id))
    }

    pub fn get_folder_contents(&self, pid: &str, path: &str) -> Result<Value> {
        require("pid", pid)?;
        require("folder path", path)?;
        let url = self.endpoint(&["resource", pid, "folders", path], true)?;
        self.json(Method::GET, url, Body::Empty, Scope::file(pid, path))
    }

    pub fn create_folder(&self, pid: &str, path: &str) -> Result<Value> {
        require("pid", pid)?;
        require("folder path", path)?;
        let url = self.endpoint(&["resource", pid, "folders", path], true)?;
        self.json(Method::PUT, url, Body::Empty, Scope::resource(pid))
    }

    pub fn delete_folder(&self, pid: &str, path: &str) -> Result<Value> {
        require("pid", pid)?;
        require("folder path", path)?;
        let url = self.endpoint(&["resource", pid, "folders", path], true)?;
        self.json(Method::DELETE, url, Body::Empty, Scope::file(pid, path))
    }

    /// Moves or renames a file or folder inside a resource.
    pub fn move_or_rename(&self, pid: &str, source_path: &str, target_path: &str) -> Result<Value> {
        require("pid", pid)?;
        require("source_path", source_path)?;
        require("target_path", target_path)?;
        let form = vec![
            ("source_path", source_path.to_string()),
            ("target_path", target_path.to_string()),
        ];
        self.function(pid, &["move-or-rename"], form)
    }

    /// Zips a folder of a resource into `output_zip_file_name`.
    pub fn zip_folder(
        &self,
        pid: &str,
        input_coll_path: &str,
        output_zip_file_name: &str,
        remove_original: bool,
    ) -> Result<Value> {
        require("pid", pid)?;
        require("input_coll_path", input_coll_path)?;
        require("output_zip_file_name", output_zip_file_name)?;
        let form = vec![
            ("input_coll_path", input_coll_path.to_string()),
            ("output_zip_file_name", output_zip_file_name.to_string()),
            ("remove_original_after_zip", remove_original.to_string()),
        ];
        self.function(pid, &["zip"], form)
    }

    /// Unzips a zip file stored in a resource.
    pub fn unzip_file(&self, pid: &str, zip_path: &str, remove_original: bool) -> Result<Value> {
        require("pid", pid)?;
        require("zip_path", zip_path)?;
        let form = vec![("remove_original_zip", remove_original.to_string())];
        self.function(pid, &["unzip", zip_path], form)
    }

    /// Copies the resource bag into the caller's iRODS user zone.
    pub fn replicate_bag_to_irods_user_zone(&self, pid: &str) -> Result<Value> {
        require("pid", pid)?;
        self.function(pid, &["rep-res-bag-to-irods-user-zone"], Vec::new())
    }

    /// Sets the content type of a file (e.g. `NetCDF`, `GeoRaster`, `GeoFeature`).
    pub fn set_file_type(&self, pid: &str, file_path: &str, file_type: &str) -> Result<Value> {
        require("pid", pid)?;
        require("file_path", file_path)?;
        require("file_type", file_type)?;
        self.function(pid, &["set-file-type", file_path, file_type], Vec::new())
    }

    fn function(&self, pid: &str, path: &[&str], form: Vec<(&str, String)>) -> Result<Value> {
        let mut segments = vec!["resource", pid, "functions"];
        segments.extend_from_slice(path);
        let url = self.endpoint(&segments, true)?;
        self.json(Method::POST, url, Body::Form(form), Scope::resource(pid))
    }
}

fn resource_id(reply: &Value) -> Option<String> {
    reply
        .get("resource_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::Argument(format!("{} is not a directory", dir.display())));
    }
    Ok(())
}
