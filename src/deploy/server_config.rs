//! Renders the follow-up server configuration from a template.
//!
//! The template is plain text with three placeholders: `%IP%`,
//! `%ROOT_PASSWORD%`, and `%NEW_USER_PASSWORD%`. Every occurrence of each is
//! replaced.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::InstanceSnapshot;

/// Placeholder for the instance's public address.
pub const IP_PLACEHOLDER: &str = "%IP%";
/// Placeholder for the provider-issued root password.
pub const ROOT_PASSWORD_PLACEHOLDER: &str = "%ROOT_PASSWORD%";
/// Placeholder for the generated password of the restricted user.
pub const NEW_USER_PASSWORD_PLACEHOLDER: &str = "%NEW_USER_PASSWORD%";

/// Errors raised while rendering the server configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum TemplateError {
    /// Raised when the template cannot be read.
    #[error("could not read template {path}: {message}")]
    Read {
        /// Template location.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the rendered file cannot be written.
    #[error("could not write server configuration {path}: {message}")]
    Write {
        /// Destination location.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a path has no file name component.
    #[error("path {path} does not name a file")]
    NotAFile {
        /// Offending path.
        path: Utf8PathBuf,
    },
}

/// Generates a 32-character hexadecimal secret.
#[must_use]
pub fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Substitutes the placeholders in `template`.
#[must_use]
pub fn render_server_config(
    template: &str,
    instance: &InstanceSnapshot,
    new_user_password: &str,
) -> String {
    template
        .replace(IP_PLACEHOLDER, &instance.main_ip)
        .replace(
            ROOT_PASSWORD_PLACEHOLDER,
            instance.default_password.as_deref().unwrap_or_default(),
        )
        .replace(NEW_USER_PASSWORD_PLACEHOLDER, new_user_password)
}

/// Reads the template at `template_path`, renders it for `instance` with a
/// freshly generated user password, and writes the result to `output_path`.
/// Returns the path written.
///
/// # Errors
///
/// Returns [`TemplateError::Read`] when the template is missing or
/// unreadable and [`TemplateError::Write`] when the output cannot be written.
pub fn write_server_config(
    template_path: &Utf8Path,
    output_path: &Utf8Path,
    instance: &InstanceSnapshot,
) -> Result<Utf8PathBuf, TemplateError> {
    let template = read_template(template_path)?;
    let rendered = render_server_config(&template, instance, &generate_password());
    write_output(output_path, &rendered)?;
    Ok(output_path.to_path_buf())
}

fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    path.parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."))
}

fn file_name(path: &Utf8Path) -> Result<&str, TemplateError> {
    path.file_name().ok_or_else(|| TemplateError::NotAFile {
        path: path.to_path_buf(),
    })
}

fn read_template(path: &Utf8Path) -> Result<String, TemplateError> {
    let read_error = |err: &io::Error| TemplateError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let name = file_name(path)?;
    let dir = Dir::open_ambient_dir(parent_dir(path), ambient_authority())
        .map_err(|err| read_error(&err))?;
    dir.read_to_string(name).map_err(|err| read_error(&err))
}

fn write_output(path: &Utf8Path, contents: &str) -> Result<(), TemplateError> {
    let write_error = |err: &io::Error| TemplateError::Write {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let name = file_name(path)?;
    let parent = parent_dir(path);
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| write_error(&err))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| write_error(&err))?;
    dir.write(name, contents).map_err(|err| write_error(&err))
}
