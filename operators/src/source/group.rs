use super::InputRaster;
use crate::error;
use crate::util::Result;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Separates the levels of nested group keys, e.g. `2020/landsat/nir`
pub const KEY_SEPARATOR: char = '/';

#[derive(Clone, Debug)]
pub enum GroupItem {
    Raster(InputRaster),
    Group(InputRasterGroup),
}

/// A tree of named input rasters.
///
/// Keys may address nested groups by joining the names with [`KEY_SEPARATOR`].
#[derive(Clone, Debug, Default)]
pub struct InputRasterGroup {
    items: BTreeMap<String, GroupItem>,
}

impl InputRasterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rasters below `folder` with one of `extensions`, nested like the folders.
    ///
    /// Extensions are compared case insensitive and include the dot, `""` matches
    /// files without extension. Rasters are keyed by their file stem.
    pub fn from_folder(folder: &Path, extensions: &[&str]) -> Result<Self> {
        Self::from_folder_filtered(folder, extensions, |_| true)
    }

    /// Like [`InputRasterGroup::from_folder`], keeping only files for which `filter`
    /// returns true
    pub fn from_folder_filtered(
        folder: &Path,
        extensions: &[&str],
        filter: impl Fn(&Path) -> bool,
    ) -> Result<Self> {
        let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
        let mut group = Self::new();

        for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
            let entry = entry.context(error::FolderWalk { folder })?;
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(folder) else {
                continue;
            };

            if entry.file_type().is_dir() {
                group.ensure_group(&key_of(relative, relative.file_name()));
                continue;
            }

            let extension = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default();
            if !extensions.contains(&extension) || !filter(path) {
                continue;
            }

            group.set_raster(
                &key_of(relative, relative.file_stem()),
                InputRaster::new(path),
            );
        }

        Ok(group)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds `raster`, creating missing intermediate groups
    pub fn set_raster(&mut self, key: &str, raster: InputRaster) {
        self.set_item(key, GroupItem::Raster(raster));
    }

    pub fn set_group(&mut self, key: &str, group: InputRasterGroup) {
        self.set_item(key, GroupItem::Group(group));
    }

    pub fn raster(&self, key: &str) -> Option<&InputRaster> {
        match self.item(key)? {
            GroupItem::Raster(raster) => Some(raster),
            GroupItem::Group(_) => None,
        }
    }

    pub fn group(&self, key: &str) -> Option<&InputRasterGroup> {
        match self.item(key)? {
            GroupItem::Group(group) => Some(group),
            GroupItem::Raster(_) => None,
        }
    }

    /// The rasters directly in this group
    pub fn rasters(&self) -> impl Iterator<Item = (&str, &InputRaster)> {
        self.items.iter().filter_map(|(key, item)| match item {
            GroupItem::Raster(raster) => Some((key.as_str(), raster)),
            GroupItem::Group(_) => None,
        })
    }

    /// The groups directly in this group
    pub fn groups(&self) -> impl Iterator<Item = (&str, &InputRasterGroup)> {
        self.items.iter().filter_map(|(key, item)| match item {
            GroupItem::Group(group) => Some((key.as_str(), group)),
            GroupItem::Raster(_) => None,
        })
    }

    /// All rasters of the tree with their full keys
    pub fn flat_rasters(&self) -> Vec<(String, &InputRaster)> {
        let mut rasters = Vec::new();
        for (key, item) in &self.items {
            match item {
                GroupItem::Raster(raster) => rasters.push((key.clone(), raster)),
                GroupItem::Group(group) => rasters.extend(
                    group
                        .flat_rasters()
                        .into_iter()
                        .map(|(inner, raster)| (format!("{key}{KEY_SEPARATOR}{inner}"), raster)),
                ),
            }
        }
        rasters
    }

    /// The first raster directly in this group matching `predicate`
    pub fn find_raster(
        &self,
        predicate: impl Fn(&str, &InputRaster) -> bool,
    ) -> Option<(&str, &InputRaster)> {
        self.rasters().find(|(key, raster)| predicate(key, raster))
    }

    fn item(&self, key: &str) -> Option<&GroupItem> {
        match key.split_once(KEY_SEPARATOR) {
            None => self.items.get(key),
            Some((parent, rest)) => match self.items.get(parent)? {
                GroupItem::Group(group) => group.item(rest),
                GroupItem::Raster(_) => None,
            },
        }
    }

    fn set_item(&mut self, key: &str, item: GroupItem) {
        match key.split_once(KEY_SEPARATOR) {
            None => {
                self.items.insert(key.to_string(), item);
            }
            Some((parent, rest)) => {
                let mut group = self.take_group(parent);
                group.set_item(rest, item);
                self.items.insert(parent.to_string(), GroupItem::Group(group));
            }
        }
    }

    fn ensure_group(&mut self, key: &str) {
        let (name, rest) = match key.split_once(KEY_SEPARATOR) {
            Some((name, rest)) => (name, Some(rest)),
            None => (key, None),
        };

        let mut group = self.take_group(name);
        if let Some(rest) = rest {
            group.ensure_group(rest);
        }
        self.items.insert(name.to_string(), GroupItem::Group(group));
    }

    /// Removes the group `name`, a raster of that name is dropped
    fn take_group(&mut self, name: &str) -> InputRasterGroup {
        match self.items.remove(name) {
            Some(GroupItem::Group(group)) => group,
            Some(GroupItem::Raster(_)) | None => InputRasterGroup::new(),
        }
    }
}

/// The group key of `relative`, its last component replaced by `name`
fn key_of(relative: &Path, name: Option<&std::ffi::OsStr>) -> String {
    relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .map(|component| component.as_os_str())
        .chain(name)
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(&KEY_SEPARATOR.to_string())
}
