use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const WELCOME_FILE: &str = "main.js";
pub const WELCOME_PROGRAM: &str = r#"console.log("Welcome to Parado!");

function greet(name) {
  return `Hello, ${name}! Parado is ready to assist you.`;
}

console.log(greet("Developer"));
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferId(u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Buffer {
    pub id: BufferId,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("cannot delete the last remaining file")]
    LastBuffer,
    #[error("file '{0}' already exists")]
    DuplicateName(String),
    #[error("file '{0}' not found")]
    UnknownName(String),
    #[error("no file with id {0}")]
    UnknownId(BufferId),
    #[error("invalid file name '{0}'")]
    InvalidName(String),
}

/// The open files of a workspace. Never empty; exactly one buffer is active.
#[derive(Debug, Clone)]
pub struct BufferStore {
    buffers: Vec<Buffer>,
    active: BufferId,
    next_id: u64,
}

fn validate_name(name: &str) -> Result<(), BufferError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
    {
        return Err(BufferError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl BufferStore {
    pub fn new(name: &str, content: &str) -> Result<Self, BufferError> {
        validate_name(name)?;
        let id = BufferId(1);
        Ok(Self {
            buffers: vec![Buffer {
                id,
                name: name.to_string(),
                content: content.to_string(),
            }],
            active: id,
            next_id: 2,
        })
    }

    pub fn with_welcome() -> Self {
        let id = BufferId(1);
        Self {
            buffers: vec![Buffer {
                id,
                name: WELCOME_FILE.to_string(),
                content: WELCOME_PROGRAM.to_string(),
            }],
            active: id,
            next_id: 2,
        }
    }

    /// Adds a buffer and makes it active.
    pub fn create(&mut self, name: &str, content: &str) -> Result<BufferId, BufferError> {
        validate_name(name)?;
        if self.find_by_name(name).is_some() {
            return Err(BufferError::DuplicateName(name.to_string()));
        }
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.push(Buffer {
            id,
            name: name.to_string(),
            content: content.to_string(),
        });
        self.active = id;
        Ok(id)
    }

    pub fn create_untitled(&mut self) -> BufferId {
        let mut n = self.buffers.len();
        loop {
            let name = format!("script_{n}.js");
            if let Ok(id) = self.create(&name, "") {
                return id;
            }
            n += 1;
        }
    }

    pub fn delete(&mut self, id: BufferId) -> Result<Buffer, BufferError> {
        let index = self
            .buffers
            .iter()
            .position(|b| b.id == id)
            .ok_or(BufferError::UnknownId(id))?;
        if self.buffers.len() <= 1 {
            return Err(BufferError::LastBuffer);
        }
        let removed = self.buffers.remove(index);
        if self.active == id {
            self.active = self.buffers[0].id;
        }
        Ok(removed)
    }

    pub fn select(&mut self, id: BufferId) -> Result<(), BufferError> {
        if self.get(id).is_none() {
            return Err(BufferError::UnknownId(id));
        }
        self.active = id;
        Ok(())
    }

    pub fn rename(&mut self, id: BufferId, name: &str) -> Result<(), BufferError> {
        validate_name(name)?;
        if self.find_by_name(name).is_some_and(|b| b.id != id) {
            return Err(BufferError::DuplicateName(name.to_string()));
        }
        let buffer = self.get_mut(id).ok_or(BufferError::UnknownId(id))?;
        buffer.name = name.to_string();
        Ok(())
    }

    pub fn update(&mut self, id: BufferId, content: &str) -> Result<(), BufferError> {
        let buffer = self.get_mut(id).ok_or(BufferError::UnknownId(id))?;
        buffer.content = content.to_string();
        Ok(())
    }

    pub fn update_active(&mut self, content: &str) {
        let id = self.active_id();
        if let Some(buffer) = self.get_mut(id) {
            buffer.content = content.to_string();
        }
    }

    pub fn append_active(&mut self, text: &str) {
        let id = self.active_id();
        if let Some(buffer) = self.get_mut(id) {
            buffer.content.push_str(text);
        }
    }

    pub fn active(&self) -> &Buffer {
        self.buffers
            .iter()
            .find(|b| b.id == self.active)
            .unwrap_or(&self.buffers[0])
    }

    pub fn active_id(&self) -> BufferId {
        self.active().id
    }

    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.id == id)
    }

    fn get_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.buffers.iter_mut().find(|b| b.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.name == name)
    }

    pub fn id_by_name(&self, name: &str) -> Result<BufferId, BufferError> {
        self.find_by_name(name)
            .map(|b| b.id)
            .ok_or_else(|| BufferError::UnknownName(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.buffers.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for BufferStore {
    fn default() -> Self {
        Self::with_welcome()
    }
}
