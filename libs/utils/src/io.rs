// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! I/O utility functions.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};

/// Reads a file and deserializes its JSON content into the specified type.
pub async fn read_file<P, T>(path: P) -> std::io::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    File::open(path.as_ref())
        .await?
        .read_to_end(&mut buf)
        .await?;
    serde_json::from_slice(&buf).map_err(std::io::Error::other)
}

/// Replaces the content of `path` with `content`.
///
/// The content is written to a temporary file next to `path` which is then
/// renamed, so readers never observe a partially written file. Missing parent
/// directories are created.
pub async fn write_file_atomic(path: impl AsRef<Path>, content: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::other(format!("{} is not a file path", path.display())))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = File::create(&tmp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp_path, path).await
}

/// Returns a temporary path in the system's temp directory, prefixed with the current thread name.
pub fn get_tmp_path<S: AsRef<str>>(name: S) -> PathBuf {
    let path = std::env::temp_dir();
    let current_thread = std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .replace("::", "_");
    path.join(format!("{}_{}", current_thread, name.as_ref()))
}
