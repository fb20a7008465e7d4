// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Nerd Font installation.
//!
//! On Linux the release archive is downloaded straight from the Nerd Fonts
//! project and unpacked into the per-user font directory. Only font files are
//! kept, everything else in the archive (licenses, readmes) is dropped. The
//! directory layout inside the archive is flattened.
//!
//! Terminal emulators do not pick up a new font on their own. Known
//! configuration files are patched with a font directive, but only when they
//! do not already declare a font. A user's explicit choice always wins.

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs::{read_to_string, File, OpenOptions},
    io::{self, Cursor, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

const FONT_EXTENSIONS: [&str; 2] = ["ttf", "otf"];

/// Check if directory already holds any font file.
///
/// # Errors
///
/// - Return [`FontError::Pattern`] if directory cannot be turned into a glob.
pub fn has_font_files(dir: &Path) -> Result<bool> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    for extension in FONT_EXTENSIONS {
        let mut matches = glob::glob(&format!("{base}/*.{extension}"))?;
        if matches.any(|entry| entry.is_ok()) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Download release archive into memory.
///
/// Progress is reported through given progress bar.
///
/// # Errors
///
/// - Return [`FontError::Http`] if request fails or server reports an error.
/// - Return [`FontError::IndicatifStyleTemplate`] if progress style is bad.
#[instrument(skip(bar), level = "debug")]
pub async fn download(url: &str, bar: ProgressBar) -> Result<Vec<u8>> {
    info!("download {url}");
    let response = reqwest::get(url).await?.error_for_status()?;

    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<30}  [{wide_bar:.yellow/blue}] {bytes}/{total_bytes}",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(url.rsplit('/').next().unwrap_or(url).to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    if let Some(length) = response.content_length() {
        bar.set_length(length);
    }

    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        bar.inc(chunk.len() as u64);
        data.extend_from_slice(&chunk);
    }
    bar.finish_and_clear();

    Ok(data)
}

/// Extract font files from zip archive into target directory.
///
/// Returns number of font files written.
///
/// # Errors
///
/// - Return [`FontError::Zip`] if archive is malformed.
/// - Return [`FontError::Io`] if font directory or files cannot be written.
pub fn extract(archive: &[u8], dir: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(archive))?;
    mkdirp::mkdirp(dir).map_err(|err| FontError::io(err, dir))?;

    let mut count = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() {
            continue;
        }

        // INVARIANT: Never write outside of target directory.
        let Some(name) = entry.enclosed_name() else {
            warn!("skip unsafe archive entry {:?}", entry.name());
            continue;
        };

        if !is_font(&name) {
            continue;
        }

        let Some(file_name) = name.file_name() else {
            continue;
        };

        let target = dir.join(file_name);
        debug!("extract {:?}", target.display());
        let mut out = File::create(&target).map_err(|err| FontError::io(err, &target))?;
        io::copy(&mut entry, &mut out).map_err(|err| FontError::io(err, &target))?;
        count += 1;
    }

    Ok(count)
}

/// Append `font_family` directive to kitty configuration.
///
/// Returns `true` if file was patched. Missing files, and files already
/// declaring a font family, are left alone.
///
/// # Errors
///
/// - Return [`FontError::Io`] if file cannot be read or written.
pub fn patch_kitty(path: &Path, family: &str) -> Result<bool> {
    let Some(content) = read_existing(path)? else {
        return Ok(false);
    };

    let declared = content
        .lines()
        .map(str::trim_start)
        .any(|line| line.starts_with("font_family"));
    if declared {
        debug!("kitty configuration already declares a font family");
        return Ok(false);
    }

    append(path, &content, &format!("font_family {family}\n"))?;
    Ok(true)
}

/// Append `[font.normal]` table to alacritty configuration.
///
/// Returns `true` if file was patched. Missing files, and files already
/// declaring a `font.normal` table, are left alone.
///
/// # Errors
///
/// - Return [`FontError::Io`] if file cannot be read or written.
/// - Return [`FontError::Toml`] if file is not valid TOML.
pub fn patch_alacritty(path: &Path, family: &str) -> Result<bool> {
    let Some(content) = read_existing(path)? else {
        return Ok(false);
    };

    let document: toml::Table = content.parse().map_err(|err| FontError::Toml {
        source: err,
        path: path.to_path_buf(),
    })?;
    let declared = document
        .get("font")
        .and_then(|font| font.get("normal"))
        .is_some();
    if declared {
        debug!("alacritty configuration already declares a normal font");
        return Ok(false);
    }

    append(
        path,
        &content,
        &format!("[font.normal]\nfamily = {}\n", toml::Value::from(family)),
    )?;
    Ok(true)
}

fn is_font(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| FONT_EXTENSIONS.contains(&ext.as_str()))
}

fn read_existing(path: &Path) -> Result<Option<String>> {
    match read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(FontError::io(err, path)),
    }
}

fn append(path: &Path, content: &str, addition: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|err| FontError::io(err, path))?;

    // INVARIANT: Keep a blank line between existing content and the addition.
    let separator = match content {
        "" => "",
        content if content.ends_with('\n') => "\n",
        _ => "\n\n",
    };

    file.write_all(format!("{separator}{addition}").as_bytes())
        .map_err(|err| FontError::io(err, path))
}

/// Font installation error types.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    /// Downloading release archive fails.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Release archive is malformed.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// Font directory cannot be searched.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Terminal configuration is not valid TOML.
    #[error("failed to parse terminal configuration at {:?}", path.display())]
    Toml {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    /// File system operation fails.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

impl FontError {
    fn io(source: io::Error, path: &Path) -> Self {
        Self::Io {
            source,
            path: path.to_path_buf(),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = FontError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use zip::{write::SimpleFileOptions, ZipWriter};

    fn archive(entries: &[(&str, &str)]) -> anyhow::Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default())?;
            writer.write_all(content.as_bytes())?;
        }

        Ok(writer.finish()?.into_inner())
    }

    #[sealed_test]
    fn extract_keeps_only_font_files() -> anyhow::Result<()> {
        let data = archive(&[
            ("JetBrainsMonoNerdFont-Regular.ttf", "regular"),
            ("nested/JetBrainsMonoNerdFont-Bold.TTF", "bold"),
            ("Extra.otf", "extra"),
            ("OFL.txt", "license"),
            ("README.md", "readme"),
        ])?;

        let dir = Path::new("fonts/JetBrainsMonoNerdFont");
        assert!(!has_font_files(dir)?);

        let count = extract(&data, dir)?;
        assert_eq!(count, 3);
        assert_eq!(
            read_to_string(dir.join("JetBrainsMonoNerdFont-Bold.TTF"))?,
            "bold"
        );
        assert!(dir.join("Extra.otf").is_file());
        assert!(!dir.join("OFL.txt").exists());
        assert!(has_font_files(dir)?);

        Ok(())
    }

    #[test]
    fn extract_rejects_garbage_archive() {
        let result = extract(b"definitely not a zip", Path::new("unused"));
        assert!(matches!(result, Err(FontError::Zip(_))));
    }

    #[sealed_test]
    fn kitty_patched_once() -> anyhow::Result<()> {
        std::fs::write("kitty.conf", "font_size 12.0")?;

        assert!(patch_kitty(Path::new("kitty.conf"), "JetBrainsMono Nerd Font")?);
        assert!(!patch_kitty(Path::new("kitty.conf"), "JetBrainsMono Nerd Font")?);

        let expect = indoc! {r#"
            font_size 12.0

            font_family JetBrainsMono Nerd Font
        "#};
        assert_eq!(read_to_string("kitty.conf")?, expect);

        Ok(())
    }

    #[sealed_test]
    fn kitty_with_own_font_untouched() -> anyhow::Result<()> {
        let content = "  font_family Fira Code\n";
        std::fs::write("kitty.conf", content)?;

        assert!(!patch_kitty(Path::new("kitty.conf"), "JetBrainsMono Nerd Font")?);
        assert_eq!(read_to_string("kitty.conf")?, content);

        Ok(())
    }

    #[sealed_test]
    fn missing_terminal_configs_ignored() -> anyhow::Result<()> {
        assert!(!patch_kitty(Path::new("kitty.conf"), "X")?);
        assert!(!patch_alacritty(Path::new("alacritty.toml"), "X")?);
        assert!(!Path::new("kitty.conf").exists());

        Ok(())
    }

    #[sealed_test]
    fn alacritty_patched_once() -> anyhow::Result<()> {
        std::fs::write(
            "alacritty.toml",
            indoc! {r#"
                [font]
                size = 12.0
            "#},
        )?;

        assert!(patch_alacritty(Path::new("alacritty.toml"), "JetBrainsMono Nerd Font")?);
        assert!(!patch_alacritty(Path::new("alacritty.toml"), "JetBrainsMono Nerd Font")?);

        let result = read_to_string("alacritty.toml")?;
        let expect = indoc! {r#"
            [font]
            size = 12.0

            [font.normal]
            family = "JetBrainsMono Nerd Font"
        "#};
        assert_eq!(result, expect);

        let document: toml::Table = result.parse()?;
        assert_eq!(
            document["font"]["normal"]["family"].as_str(),
            Some("JetBrainsMono Nerd Font")
        );

        Ok(())
    }

    #[sealed_test]
    fn alacritty_invalid_toml_fails() -> anyhow::Result<()> {
        std::fs::write("alacritty.toml", "[font\nsize = ")?;
        let result = patch_alacritty(Path::new("alacritty.toml"), "X");
        assert!(matches!(result, Err(FontError::Toml { .. })));

        Ok(())
    }
}
