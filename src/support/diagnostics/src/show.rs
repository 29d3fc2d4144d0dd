use source_files::{Source, SourceFiles};
use std::path::Path;

pub trait Show {
    fn show(
        &self,
        w: &mut dyn std::fmt::Write,
        source_files: &SourceFiles,
        project_root: Option<&Path>,
    ) -> std::fmt::Result;

    fn eprintln(&self, source_files: &SourceFiles) {
        let mut message = String::new();
        self.show(&mut message, source_files, None).unwrap();
        eprintln!("{}", message);
    }
}

pub fn into_show<T: Show + 'static>(show: T) -> Box<dyn Show> {
    Box::new(show)
}

/// Renders the shortest useful filename for a source, relative to the project
/// root when one is known.
pub fn minimal_filename<'a>(
    source: Source,
    source_files: &'a SourceFiles,
    project_root: Option<&Path>,
) -> String {
    let filepath = source_files.get(source.key).filepath();

    project_root
        .and_then(|root| filepath.strip_prefix(root).ok())
        .unwrap_or(filepath)
        .to_str()
        .unwrap_or("<invalid unicode filename>")
        .to_string()
}
