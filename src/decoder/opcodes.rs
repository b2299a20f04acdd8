//! Константы бинарного формата RDB.
//!
//! Значения совпадают с `rdb.h` Redis. Используются в модулях `rdb` и
//! `mod` (маппинг типов объектов).

/// Магическое начало файла.
pub const RDB_MAGIC: &[u8; 5] = b"REDIS";
/// Максимальная поддерживаемая версия формата.
pub const RDB_MAX_VERSION: u32 = 12;
/// Начиная с этой версии после EOF идёт 8-байтовая контрольная сумма.
pub const RDB_CHECKSUM_MIN_VERSION: u32 = 5;

// Опкоды служебных записей

/// Информация о слоте кластера (RDB 12)
pub const RDB_OPCODE_SLOT_INFO: u8 = 0xF4;
/// Библиотека функций
pub const RDB_OPCODE_FUNCTION2: u8 = 0xF5;
/// Библиотека функций (pre-GA формат)
pub const RDB_OPCODE_FUNCTION_PRE_GA: u8 = 0xF6;
/// Данные модуля, не привязанные к ключу
pub const RDB_OPCODE_MODULE_AUX: u8 = 0xF7;
/// LRU idle time следующего ключа
pub const RDB_OPCODE_IDLE: u8 = 0xF8;
/// LFU частота следующего ключа
pub const RDB_OPCODE_FREQ: u8 = 0xF9;
/// Вспомогательное поле
pub const RDB_OPCODE_AUX: u8 = 0xFA;
/// Размеры хэш-таблиц базы
pub const RDB_OPCODE_RESIZEDB: u8 = 0xFB;
/// Время истечения в миллисекундах
pub const RDB_OPCODE_EXPIRETIME_MS: u8 = 0xFC;
/// Время истечения в секундах
pub const RDB_OPCODE_EXPIRETIME: u8 = 0xFD;
/// Выбор базы
pub const RDB_OPCODE_SELECTDB: u8 = 0xFE;
/// Конец файла
pub const RDB_OPCODE_EOF: u8 = 0xFF;

// Типы объектов

pub const RDB_TYPE_STRING: u8 = 0;
pub const RDB_TYPE_LIST: u8 = 1;
pub const RDB_TYPE_SET: u8 = 2;
pub const RDB_TYPE_ZSET: u8 = 3;
pub const RDB_TYPE_HASH: u8 = 4;
pub const RDB_TYPE_ZSET_2: u8 = 5;
pub const RDB_TYPE_MODULE_PRE_GA: u8 = 6;
pub const RDB_TYPE_MODULE_2: u8 = 7;
pub const RDB_TYPE_HASH_ZIPMAP: u8 = 9;
pub const RDB_TYPE_LIST_ZIPLIST: u8 = 10;
pub const RDB_TYPE_SET_INTSET: u8 = 11;
pub const RDB_TYPE_ZSET_ZIPLIST: u8 = 12;
pub const RDB_TYPE_HASH_ZIPLIST: u8 = 13;
pub const RDB_TYPE_LIST_QUICKLIST: u8 = 14;
pub const RDB_TYPE_STREAM_LISTPACKS: u8 = 15;
pub const RDB_TYPE_HASH_LISTPACK: u8 = 16;
pub const RDB_TYPE_ZSET_LISTPACK: u8 = 17;
pub const RDB_TYPE_LIST_QUICKLIST_2: u8 = 18;
pub const RDB_TYPE_STREAM_LISTPACKS_2: u8 = 19;
pub const RDB_TYPE_SET_LISTPACK: u8 = 20;
pub const RDB_TYPE_STREAM_LISTPACKS_3: u8 = 21;
pub const RDB_TYPE_HASH_METADATA_PRE_GA: u8 = 22;
pub const RDB_TYPE_HASH_LISTPACK_EX_PRE_GA: u8 = 23;
pub const RDB_TYPE_HASH_METADATA: u8 = 24;
pub const RDB_TYPE_HASH_LISTPACK_EX: u8 = 25;

// Кодирование длины: старшие два бита первого байта

pub const RDB_6BITLEN: u8 = 0;
pub const RDB_14BITLEN: u8 = 1;
pub const RDB_32BITLEN: u8 = 0x80;
pub const RDB_64BITLEN: u8 = 0x81;
pub const RDB_ENCVAL: u8 = 3;

// Специальные кодирования строк (младшие 6 бит при RDB_ENCVAL)

pub const RDB_ENC_INT8: u8 = 0;
pub const RDB_ENC_INT16: u8 = 1;
pub const RDB_ENC_INT32: u8 = 2;
pub const RDB_ENC_LZF: u8 = 3;

/// Имя кодирования по байту типа объекта (для сообщений об ошибках).
pub fn rdb_type_name(rdb_type: u8) -> &'static str {
    match rdb_type {
        RDB_TYPE_STRING => "string",
        RDB_TYPE_LIST => "list",
        RDB_TYPE_SET => "set",
        RDB_TYPE_ZSET => "zset",
        RDB_TYPE_HASH => "hash",
        RDB_TYPE_ZSET_2 => "zset2",
        RDB_TYPE_MODULE_PRE_GA => "module-pre-ga",
        RDB_TYPE_MODULE_2 => "module2",
        RDB_TYPE_HASH_ZIPMAP => "hash-zipmap",
        RDB_TYPE_LIST_ZIPLIST => "list-ziplist",
        RDB_TYPE_SET_INTSET => "set-intset",
        RDB_TYPE_ZSET_ZIPLIST => "zset-ziplist",
        RDB_TYPE_HASH_ZIPLIST => "hash-ziplist",
        RDB_TYPE_LIST_QUICKLIST => "list-quicklist",
        RDB_TYPE_STREAM_LISTPACKS => "stream-listpacks",
        RDB_TYPE_HASH_LISTPACK => "hash-listpack",
        RDB_TYPE_ZSET_LISTPACK => "zset-listpack",
        RDB_TYPE_LIST_QUICKLIST_2 => "list-quicklist2",
        RDB_TYPE_STREAM_LISTPACKS_2 => "stream-listpacks2",
        RDB_TYPE_SET_LISTPACK => "set-listpack",
        RDB_TYPE_STREAM_LISTPACKS_3 => "stream-listpacks3",
        RDB_TYPE_HASH_METADATA_PRE_GA | RDB_TYPE_HASH_METADATA => "hash-metadata",
        RDB_TYPE_HASH_LISTPACK_EX_PRE_GA | RDB_TYPE_HASH_LISTPACK_EX => "hash-listpack-ex",
        _ => "unknown",
    }
}
