//! Writing a built DTB to disk.

use std::fs;
use std::path::Path;

use super::DtbBuilder;
use crate::audio::AudioAssembler;
use crate::dom::Document;
use crate::error::{Error, Result};
use crate::progress::{Progress, percent};
use crate::store::to_file_path;

impl DtbBuilder {
    /// Write the built documents, assemble audio and copy images into
    /// `target_dir`.
    ///
    /// Everything already inside `target_dir` is deleted first. Returns
    /// `Ok(false)` when `progress` cancels; files written before that point
    /// stay on disk.
    pub fn save(&self, target_dir: &Path, progress: &mut dyn Progress) -> Result<bool> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::Configuration("nothing built to save".into()))?;

        clear_dir(target_dir)?;
        log::info!("Saving DTB to {}", target_dir.display());

        let mut documents: Vec<(&str, &Document)> = state
            .smils
            .iter()
            .map(|(name, doc)| (name.as_str(), doc))
            .collect();
        documents.push((self.options.ncc_name.as_str(), &state.ncc));
        if let Some(content) = &state.content {
            documents.push((self.options.content_name.as_str(), content));
        }

        for (i, (name, doc)) in documents.iter().enumerate() {
            if progress
                .report(percent(i, documents.len()), &format!("Writing {name}"))
                .is_cancel()
            {
                log::info!("Save cancelled before {name}");
                return Ok(false);
            }
            if name.ends_with(".smil") && doc.find_by_tag("seq").is_none() {
                return Err(Error::structural(format!("{name} has no main <seq>")));
            }
            log::debug!("Writing {name}");
            fs::write(target_dir.join(name), doc.serialize())?;
        }

        let assembler = AudioAssembler::new(&self.options);
        if !assembler.assemble_all(target_dir, &state.audio_plan, progress)? {
            return Ok(false);
        }

        let total_images: usize = state.image_plan.iter().map(Vec::len).sum();
        for (i, image) in state.image_plan.iter().flatten().enumerate() {
            if progress
                .report(percent(i, total_images), &format!("Copying {}", image.name))
                .is_cancel()
            {
                log::info!("Save cancelled before {}", image.name);
                return Ok(false);
            }
            let source = to_file_path(&image.source)?;
            log::debug!("Copying {} to {}", source.display(), image.name);
            fs::copy(&source, target_dir.join(&image.name))?;
        }

        log::info!("Saved {} document(s) to {}", documents.len(), target_dir.display());
        Ok(true)
    }
}

/// Delete the contents of `dir`, creating it when missing.
fn clear_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::progress::Silent;
    use tempfile::TempDir;

    #[test]
    fn test_clear_dir_removes_files_and_subdirs() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");
        fs::create_dir_all(target.join("sub")).unwrap();
        fs::write(target.join("old.html"), "x").unwrap();
        fs::write(target.join("sub/old.smil"), "x").unwrap();

        clear_dir(&target).unwrap();
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn test_clear_dir_creates_missing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b");
        clear_dir(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_save_without_build_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let builder = DtbBuilder::new(Vec::new(), BuildOptions::default());
        assert!(matches!(
            builder.save(dir.path(), &mut Silent),
            Err(Error::Configuration(_))
        ));
    }
}
