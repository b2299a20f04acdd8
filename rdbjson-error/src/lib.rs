//! Централизованная обработка ошибок rdbjson.
//!
//! Все публичные операции возвращают [`RdbJsonResult`], внутри которого
//! лежит [`StackError`]: корневая ошибка плюс цепочка контекстов.

pub mod ext;
pub mod macros;
pub mod stack;
pub mod status_code;
pub mod types;

// Публичный экспорт всех типов ошибок и ф-й из вложенных модулей, чтобы
// упростить доступ к ним из внешнего кода.
pub use ext::*;
pub use macros::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

pub type RdbJsonResult<T> = Result<T, StackError>;
