//! Общие помощники интеграционных тестов: сборка RDB-снимков в байтах.

#![allow(dead_code)]

use std::{io::Write, path::PathBuf};

use tempfile::{NamedTempFile, TempDir};

pub const RDB_OPCODE_AUX: u8 = 0xFA;
pub const RDB_OPCODE_RESIZEDB: u8 = 0xFB;
pub const RDB_OPCODE_EXPIRETIME_MS: u8 = 0xFC;
pub const RDB_OPCODE_SELECTDB: u8 = 0xFE;
pub const RDB_OPCODE_EOF: u8 = 0xFF;

pub const RDB_TYPE_STRING: u8 = 0;
pub const RDB_TYPE_LIST: u8 = 1;
pub const RDB_TYPE_SET: u8 = 2;
pub const RDB_TYPE_HASH: u8 = 4;
pub const RDB_TYPE_ZSET_2: u8 = 5;
pub const RDB_TYPE_HASH_LISTPACK: u8 = 16;

/// Построитель RDB-снимка.
pub struct RdbBuilder {
    bytes: Vec<u8>,
}

impl RdbBuilder {
    pub fn new(version: u32) -> Self {
        let mut bytes = b"REDIS".to_vec();
        bytes.extend_from_slice(format!("{version:04}").as_bytes());
        Self { bytes }
    }

    pub fn aux(
        mut self,
        name: &str,
        value: &str,
    ) -> Self {
        self.bytes.push(RDB_OPCODE_AUX);
        self.put_string(name.as_bytes());
        self.put_string(value.as_bytes());
        self
    }

    pub fn select_db(
        mut self,
        db: u64,
    ) -> Self {
        self.bytes.push(RDB_OPCODE_SELECTDB);
        self.put_length(db);
        self
    }

    pub fn resize_db(
        mut self,
        size: u64,
        expires: u64,
    ) -> Self {
        self.bytes.push(RDB_OPCODE_RESIZEDB);
        self.put_length(size);
        self.put_length(expires);
        self
    }

    pub fn expire_ms(
        mut self,
        ms: i64,
    ) -> Self {
        self.bytes.push(RDB_OPCODE_EXPIRETIME_MS);
        self.bytes.extend_from_slice(&ms.to_le_bytes());
        self
    }

    pub fn string(
        mut self,
        key: &str,
        value: &str,
    ) -> Self {
        self.bytes.push(RDB_TYPE_STRING);
        self.put_string(key.as_bytes());
        self.put_string(value.as_bytes());
        self
    }

    pub fn list(
        mut self,
        key: &str,
        items: &[&str],
    ) -> Self {
        self.bytes.push(RDB_TYPE_LIST);
        self.put_string(key.as_bytes());
        self.put_length(items.len() as u64);
        for item in items {
            self.put_string(item.as_bytes());
        }
        self
    }

    pub fn set(
        mut self,
        key: &str,
        members: &[&str],
    ) -> Self {
        self.bytes.push(RDB_TYPE_SET);
        self.put_string(key.as_bytes());
        self.put_length(members.len() as u64);
        for member in members {
            self.put_string(member.as_bytes());
        }
        self
    }

    pub fn hash(
        mut self,
        key: &str,
        fields: &[(&str, &str)],
    ) -> Self {
        self.bytes.push(RDB_TYPE_HASH);
        self.put_string(key.as_bytes());
        self.put_length(fields.len() as u64);
        for (field, value) in fields {
            self.put_string(field.as_bytes());
            self.put_string(value.as_bytes());
        }
        self
    }

    pub fn zset(
        mut self,
        key: &str,
        members: &[(&str, f64)],
    ) -> Self {
        self.bytes.push(RDB_TYPE_ZSET_2);
        self.put_string(key.as_bytes());
        self.put_length(members.len() as u64);
        for (member, score) in members {
            self.put_string(member.as_bytes());
            self.bytes.extend_from_slice(&score.to_le_bytes());
        }
        self
    }

    /// Запись с произвольным байтом типа и сырым телом.
    pub fn raw_entry(
        mut self,
        rdb_type: u8,
        key: &str,
        body: &[u8],
    ) -> Self {
        self.bytes.push(rdb_type);
        self.put_string(key.as_bytes());
        self.bytes.extend_from_slice(body);
        self
    }

    /// Завершает снимок маркером EOF и нулевой контрольной суммой.
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.push(RDB_OPCODE_EOF);
        self.bytes.extend_from_slice(&[0u8; 8]);
        self.bytes
    }

    /// Снимок без маркера EOF: обрывается после последней записи.
    pub fn truncated(self) -> Vec<u8> {
        self.bytes
    }

    fn put_length(
        &mut self,
        len: u64,
    ) {
        if len < 1 << 6 {
            self.bytes.push(len as u8);
        } else if len < 1 << 14 {
            self.bytes.push(0x40 | (len >> 8) as u8);
            self.bytes.push(len as u8);
        } else {
            self.bytes.push(0x80);
            self.bytes.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    fn put_string(
        &mut self,
        s: &[u8],
    ) {
        self.put_length(s.len() as u64);
        self.bytes.extend_from_slice(s);
    }
}

/// Снимок из примера: одна aux-запись, одна база, один строковый ключ.
pub fn sample_snapshot() -> Vec<u8> {
    RdbBuilder::new(11)
        .aux("redis-ver", "7.0")
        .select_db(0)
        .resize_db(1, 0)
        .string("foo", "bar")
        .finish()
}

/// Записывает байты во временный файл.
pub fn write_snapshot(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp snapshot");
    file.write_all(bytes).expect("write temp snapshot");
    file.flush().expect("flush temp snapshot");
    file
}

/// Путь к несуществующему файлу внутри временного каталога.
pub fn missing_path(dir: &TempDir) -> PathBuf {
    dir.path().join("does-not-exist.rdb")
}

/// Кол-во файлов в каталоге.
pub fn file_count(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path())
        .expect("read staging dir")
        .count()
}
