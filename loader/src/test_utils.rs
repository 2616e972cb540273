//! Archive and class-file builders shared by unit and behaviour tests.

use std::io::{Cursor, Read, Write};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

enum Entry {
    File {
        name: String,
        data: Vec<u8>,
        method: CompressionMethod,
    },
    Directory(String),
}

/// Builds an in-memory JAR from named entries, in insertion order.
#[derive(Default)]
pub struct JarBuilder {
    entries: Vec<Entry>,
}

impl JarBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a deflated file entry.
    #[must_use]
    pub fn entry(self, name: &str, data: &[u8]) -> Self {
        self.push_file(name, data, CompressionMethod::Deflated)
    }

    /// Adds a stored (uncompressed) file entry.
    #[must_use]
    pub fn stored_entry(self, name: &str, data: &[u8]) -> Self {
        self.push_file(name, data, CompressionMethod::Stored)
    }

    /// Adds a directory entry.
    #[must_use]
    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push(Entry::Directory(name.to_owned()));
        self
    }

    fn push_file(mut self, name: &str, data: &[u8], method: CompressionMethod) -> Self {
        self.entries.push(Entry::File {
            name: name.to_owned(),
            data: data.to_vec(),
            method,
        });
        self
    }

    /// Writes the archive.
    ///
    /// # Errors
    ///
    /// Returns the zip writer's error if an entry cannot be written.
    pub fn build(self) -> ZipResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in self.entries {
            match entry {
                Entry::File { name, data, method } => {
                    let options = SimpleFileOptions::default().compression_method(method);
                    writer.start_file(name, options)?;
                    writer.write_all(&data)?;
                }
                Entry::Directory(name) => {
                    writer.add_directory(name, SimpleFileOptions::default())?;
                }
            }
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// Reads every entry of `jar` as `(name, contents)`, in archive order.
///
/// # Errors
///
/// Returns the zip reader's error if `jar` is not a readable archive.
pub fn read_entries(jar: &[u8]) -> ZipResult<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(jar))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        entries.push((file.name().to_owned(), data));
    }
    Ok(entries)
}

/// Builds a minimal class file: a constant pool followed by an empty body.
///
/// The pool always starts with the class and its superclass. Extra
/// constants follow in call order.
pub struct ClassFileBuilder {
    this_class: String,
    super_class: String,
    extra: Vec<u8>,
    extra_slots: u16,
}

impl ClassFileBuilder {
    /// Length of the fixed structure written after the constant pool.
    pub const TAIL_LEN: usize = 14;

    /// Index of the first extra constant.
    const FIXED_SLOTS: u16 = 5;

    /// Starts a class named `this_class` (internal form) extending
    /// `java/lang/Object`.
    #[must_use]
    pub fn new(this_class: &str) -> Self {
        Self {
            this_class: this_class.to_owned(),
            super_class: "java/lang/Object".to_owned(),
            extra: Vec::new(),
            extra_slots: 0,
        }
    }

    /// Overrides the superclass.
    #[must_use]
    pub fn super_class(mut self, name: &str) -> Self {
        name.clone_into(&mut self.super_class);
        self
    }

    /// Appends a `CONSTANT_Utf8`.
    #[must_use]
    pub fn utf8(mut self, value: &str) -> Self {
        push_utf8(&mut self.extra, value);
        self.extra_slots += 1;
        self
    }

    /// Appends a `CONSTANT_String` and the UTF-8 constant it points at.
    #[must_use]
    pub fn string(mut self, value: &str) -> Self {
        let target = Self::FIXED_SLOTS + self.extra_slots;
        push_utf8(&mut self.extra, value);
        self.extra.push(8);
        self.extra.extend_from_slice(&target.to_be_bytes());
        self.extra_slots += 2;
        self
    }

    /// Appends a `CONSTANT_Long`, which occupies two pool slots.
    #[must_use]
    pub fn long(mut self, value: i64) -> Self {
        self.extra.push(5);
        self.extra.extend_from_slice(&value.to_be_bytes());
        self.extra_slots += 2;
        self
    }

    /// Encodes the class file.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        let count = Self::FIXED_SLOTS + self.extra_slots;
        bytes.extend_from_slice(&count.to_be_bytes());
        push_utf8(&mut bytes, &self.this_class);
        bytes.extend_from_slice(&[7, 0, 1]);
        push_utf8(&mut bytes, &self.super_class);
        bytes.extend_from_slice(&[7, 0, 3]);
        bytes.extend_from_slice(&self.extra);
        // access flags, this, super, then empty interfaces, fields, methods
        // and attributes.
        bytes.extend_from_slice(&[0x00, 0x21, 0, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0]);
        bytes
    }
}

fn push_utf8(bytes: &mut Vec<u8>, value: &str) {
    let len = u16::try_from(value.len()).unwrap_or(u16::MAX);
    bytes.push(1);
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(value.as_bytes());
}

/// A small library JAR with classes under `org.example.internal`, a service
/// registration and a manifest naming its main class.
///
/// # Errors
///
/// Returns the zip writer's error if the archive cannot be written.
pub fn sample_library() -> ZipResult<Vec<u8>> {
    JarBuilder::new()
        .entry(
            "META-INF/MANIFEST.MF",
            b"Manifest-Version: 1.0\nMain-Class: org.example.internal.Main\n",
        )
        .entry(
            "META-INF/services/org.example.internal.spi.Plugin",
            b"org.example.internal.impl.DefaultPlugin\n",
        )
        .directory("org/example/internal/")
        .entry(
            "org/example/internal/Main.class",
            &ClassFileBuilder::new("org/example/internal/Main")
                .utf8("(Lorg/example/internal/impl/DefaultPlugin;)V")
                .string("org.example.internal.config")
                .string("/org/example/internal/config.properties")
                .build(),
        )
        .entry(
            "org/example/internal/impl/DefaultPlugin.class",
            &ClassFileBuilder::new("org/example/internal/impl/DefaultPlugin").build(),
        )
        .entry("org/example/internal/config.properties", b"plugins=enabled\n")
        .build()
}
