use anyhow::{Context, Result, anyhow};
use parado_core::BufferStore;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Files on disk that back a session's buffers.
#[derive(Debug, Clone)]
pub(crate) struct Project {
    root: PathBuf,
    on_disk: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SyncPlan {
    pub(crate) write: Vec<(String, String)>,
    pub(crate) remove: Vec<String>,
    /// Buffers whose path holds a file this project never loaded; left untouched.
    pub(crate) conflicts: Vec<String>,
}

impl SyncPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.write.is_empty() && self.remove.is_empty() && self.conflicts.is_empty()
    }
}

fn is_script(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "js")
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("unsupported file name {}", path.display()))
}

impl Project {
    /// Loads one script, or every `.js` file directly inside a directory.
    ///
    /// A missing or empty directory starts from the welcome buffer when
    /// `allow_missing` is set.
    pub(crate) fn load(path: &Path, allow_missing: bool) -> Result<(Self, BufferStore)> {
        if path.is_file() {
            let name = file_name(path)?;
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed reading script file {}", path.display()))?;
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let store = BufferStore::new(&name, &content)?;
            let project = Self {
                root,
                on_disk: BTreeMap::from([(name, content)]),
            };
            return Ok((project, store));
        }

        if !path.exists() && !allow_missing {
            return Err(anyhow!("path not found: {}", path.display()));
        }

        let mut on_disk = BTreeMap::new();
        if path.is_dir() {
            let entries = fs::read_dir(path)
                .with_context(|| format!("failed listing directory {}", path.display()))?;
            for entry in entries {
                let entry_path = entry?.path();
                if !is_script(&entry_path) {
                    continue;
                }
                let content = fs::read_to_string(&entry_path).with_context(|| {
                    format!("failed reading script file {}", entry_path.display())
                })?;
                on_disk.insert(file_name(&entry_path)?, content);
            }
        }

        let store = store_from(&on_disk, allow_missing, path)?;
        Ok((
            Self {
                root: path.to_path_buf(),
                on_disk,
            },
            store,
        ))
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Differences between the buffers and the files last seen on disk.
    pub(crate) fn plan(&self, buffers: &BufferStore) -> SyncPlan {
        let mut plan = SyncPlan::default();
        for buffer in buffers.iter() {
            match self.on_disk.get(&buffer.name) {
                Some(content) if *content == buffer.content => {}
                None if self.root.join(&buffer.name).exists() => {
                    plan.conflicts.push(buffer.name.clone());
                }
                _ => plan
                    .write
                    .push((buffer.name.clone(), buffer.content.clone())),
            }
        }
        for name in self.on_disk.keys() {
            if buffers.find_by_name(name).is_none() {
                plan.remove.push(name.clone());
            }
        }
        plan
    }

    pub(crate) fn apply(&mut self, plan: &SyncPlan) -> Result<()> {
        if !plan.write.is_empty() {
            fs::create_dir_all(&self.root)
                .with_context(|| format!("failed creating {}", self.root.display()))?;
        }
        for (name, content) in &plan.write {
            let path = self.root.join(name);
            fs::write(&path, content)
                .with_context(|| format!("failed writing {}", path.display()))?;
            self.on_disk.insert(name.clone(), content.clone());
        }
        for name in &plan.remove {
            let path = self.root.join(name);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed removing {}", path.display()))?;
            }
            self.on_disk.remove(name);
        }
        Ok(())
    }

    pub(crate) fn save(&mut self, buffers: &BufferStore) -> Result<SyncPlan> {
        let plan = self.plan(buffers);
        self.apply(&plan)?;
        Ok(plan)
    }
}

fn store_from(
    on_disk: &BTreeMap<String, String>,
    allow_missing: bool,
    path: &Path,
) -> Result<BufferStore> {
    let mut files = on_disk.iter();
    let Some((first_name, first_content)) = files.next() else {
        if allow_missing {
            return Ok(BufferStore::with_welcome());
        }
        return Err(anyhow!("no .js files found in {}", path.display()));
    };

    let mut store = BufferStore::new(first_name, first_content)?;
    for (name, content) in files {
        store.create(name, content)?;
    }
    select_entry(&mut store, None)?;
    Ok(store)
}

/// Makes `entry`, else `main.js`, else the first file active.
pub(crate) fn select_entry(store: &mut BufferStore, entry: Option<&str>) -> Result<()> {
    let target = match entry {
        Some(name) => store.id_by_name(name)?,
        None => store
            .find_by_name("main.js")
            .or_else(|| store.iter().next())
            .map(|b| b.id)
            .ok_or_else(|| anyhow!("project has no files"))?,
    };
    store.select(target)?;
    Ok(())
}
