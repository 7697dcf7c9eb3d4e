use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;
use crate::vm::class_loader::source::{ClassBytes, ClassRequest, ClassSource};

/// Class files in directories and `.jar`/`.zip` archives on disk, searched in order.
#[derive(Debug, Default)]
pub struct ClassPath {
    entries: Vec<Entry>,
}

#[derive(Debug)]
enum Entry {
    Directory(PathBuf),
    Archive(Jar),
}

#[derive(Debug)]
struct Jar {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl Jar {
    fn open(path: &Path) -> Result<Jar, ZipError> {
        let archive = ZipArchive::new(File::open(path)?)?;
        Ok(Jar { path: path.to_path_buf(), archive })
    }

    fn read(&mut self, file_name: &str) -> Result<Option<Vec<u8>>, ZipError> {
        let mut file = match self.archive.by_name(file_name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }
}

fn is_archive(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("jar") | Some("zip"))
}

impl ClassPath {
    /// Archives are opened here; one that cannot be opened is skipped.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let mut entries = Vec::with_capacity(roots.len());
        for root in roots {
            if !is_archive(&root) {
                entries.push(Entry::Directory(root));
                continue;
            }
            match Jar::open(&root) {
                Ok(jar) => {
                    debug!("opened {} ({} entries)", root.display(), jar.archive.len());
                    entries.push(Entry::Archive(jar));
                }
                Err(e) => warn!("skipping class path entry {}: {}", root.display(), e),
            }
        }
        ClassPath { entries }
    }
}

impl ClassSource for ClassPath {
    fn request(&mut self, request: &ClassRequest) -> ClassBytes {
        let file_name = format!("{}.class", request.name);

        for entry in &mut self.entries {
            match entry {
                Entry::Directory(root) => {
                    let path = root.join(&file_name);
                    if !path.is_file() {
                        continue;
                    }
                    return match std::fs::read(&path) {
                        Ok(bytes) => {
                            debug!("read {} from {}", request.name, path.display());
                            ClassBytes::Ready(bytes)
                        }
                        Err(e) => {
                            warn!("could not read {}: {}", path.display(), e);
                            ClassBytes::Missing
                        }
                    };
                }
                Entry::Archive(jar) => match jar.read(&file_name) {
                    Ok(Some(bytes)) => {
                        debug!("read {} from {}", request.name, jar.path.display());
                        return ClassBytes::Ready(bytes);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("could not read {} from {}: {}", file_name, jar.path.display(), e);
                        return ClassBytes::Missing;
                    }
                },
            }
        }
        ClassBytes::Missing
    }
}
