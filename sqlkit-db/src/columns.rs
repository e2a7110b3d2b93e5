//! Typed access to the cells of the current row.
//!
//! Two access modes, kept as separate method families:
//!
//! * **Coercing** (`get`, `get_nullable`, and their `_unchecked` forms)
//!   behave exactly like the native `sqlite3_column_*` getters: asking for an
//!   integer from a text cell applies `SQLite`'s numeric conversion, NULL reads
//!   as `0` / empty.
//! * **Strict** (`get_strict`, `get_nullable_strict`) compare the cell's
//!   storage class with the one the Rust type maps to and fail with
//!   [`DbError::TypeMismatch`] instead of converting.
//!
//! Columns are addressed by ordinal (`usize`) or by result column name
//! (`&str`). Names are resolved through a per-cursor map that is built on
//! the first name lookup and then reused, unchanged, for the lifetime of the
//! cursor.

use std::cell::OnceCell;
use std::collections::HashMap;

use crate::error::{ColumnRef, DbError, DbResult};
use crate::value::{StorageClass, Value};

/// The current-row view of a stepping statement.
///
/// The raw getters apply the native engine's coercion rules when the
/// requested type differs from the stored one, and must tolerate any index:
/// out-of-range reads yield the NULL defaults.
pub trait Cursor {
    /// Number of result columns.
    fn column_count(&self) -> usize;
    /// Result column name at `index`.
    fn column_name(&self, index: usize) -> Option<String>;
    /// Storage class of the cell at `index` in the current row.
    fn storage_class(&self, index: usize) -> StorageClass;
    /// Cell as a 32-bit integer (`sqlite3_column_int`).
    fn raw_int(&self, index: usize) -> i32;
    /// Cell as a 64-bit integer (`sqlite3_column_int64`).
    fn raw_int64(&self, index: usize) -> i64;
    /// Cell as a double (`sqlite3_column_double`).
    fn raw_double(&self, index: usize) -> f64;
    /// Cell as text (`sqlite3_column_text`).
    fn raw_text(&self, index: usize) -> String;
    /// Cell as bytes (`sqlite3_column_blob`).
    fn raw_blob(&self, index: usize) -> Vec<u8>;
    /// The name map slot owned by this cursor.
    fn name_index(&self) -> &NameIndex;
}

/// Lazily built map from result column name to ordinal.
///
/// Built at most once; later lookups read the same map. Duplicate names
/// resolve to the rightmost column.
#[derive(Debug, Default)]
pub struct NameIndex {
    map: OnceCell<HashMap<String, usize>>,
}

impl NameIndex {
    /// Creates an empty, unbuilt index.
    #[must_use]
    pub const fn new() -> Self {
        Self { map: OnceCell::new() }
    }

    /// Whether the map has been built.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.map.get().is_some()
    }

    /// Looks up `name`, building the map from `cursor` on first use.
    pub fn lookup<C: Cursor + ?Sized>(&self, cursor: &C, name: &str) -> Option<usize> {
        self.map.get_or_init(|| Self::build(cursor)).get(name).copied()
    }

    fn build<C: Cursor + ?Sized>(cursor: &C) -> HashMap<String, usize> {
        let count = cursor.column_count();
        let mut map = HashMap::with_capacity(count);
        for i in 0..count {
            if let Some(name) = cursor.column_name(i) {
                map.insert(name, i);
            }
        }
        log::trace!("built column name map with {} entries", map.len());
        map
    }
}

/// Something that identifies a result column: an ordinal or a name.
pub trait ColumnIndex {
    /// Resolves to a valid ordinal of `cursor`.
    fn resolve<C: Cursor + ?Sized>(&self, cursor: &C) -> DbResult<usize>;
    /// Identifier carried by errors.
    fn column_ref(&self) -> ColumnRef;
}

impl ColumnIndex for usize {
    fn resolve<C: Cursor + ?Sized>(&self, cursor: &C) -> DbResult<usize> {
        let count = cursor.column_count();
        if *self >= count {
            return Err(DbError::IndexOutOfRange { index: *self, count });
        }
        Ok(*self)
    }

    fn column_ref(&self) -> ColumnRef {
        ColumnRef::Index(*self)
    }
}

impl ColumnIndex for &str {
    fn resolve<C: Cursor + ?Sized>(&self, cursor: &C) -> DbResult<usize> {
        cursor
            .name_index()
            .lookup(cursor, self)
            .ok_or_else(|| DbError::UnknownColumnName((*self).to_string()))
    }

    fn column_ref(&self) -> ColumnRef {
        ColumnRef::Name((*self).to_string())
    }
}

/// A Rust type a cell can be read as.
pub trait FromColumn: Sized {
    /// Storage class strict accessors require.
    const STORAGE_CLASS: StorageClass;

    /// Reads the cell with the native coercion rules.
    fn read_column<C: Cursor + ?Sized>(cursor: &C, index: usize) -> Self;
}

impl FromColumn for i32 {
    const STORAGE_CLASS: StorageClass = StorageClass::Integer;

    fn read_column<C: Cursor + ?Sized>(cursor: &C, index: usize) -> Self {
        cursor.raw_int(index)
    }
}

impl FromColumn for i64 {
    const STORAGE_CLASS: StorageClass = StorageClass::Integer;

    fn read_column<C: Cursor + ?Sized>(cursor: &C, index: usize) -> Self {
        cursor.raw_int64(index)
    }
}

impl FromColumn for f64 {
    const STORAGE_CLASS: StorageClass = StorageClass::Float;

    fn read_column<C: Cursor + ?Sized>(cursor: &C, index: usize) -> Self {
        cursor.raw_double(index)
    }
}

impl FromColumn for String {
    const STORAGE_CLASS: StorageClass = StorageClass::Text;

    fn read_column<C: Cursor + ?Sized>(cursor: &C, index: usize) -> Self {
        cursor.raw_text(index)
    }
}

impl FromColumn for Vec<u8> {
    const STORAGE_CLASS: StorageClass = StorageClass::Blob;

    fn read_column<C: Cursor + ?Sized>(cursor: &C, index: usize) -> Self {
        cursor.raw_blob(index)
    }
}

macro_rules! typed_accessors {
    (
        $ty:ty,
        $get:ident,
        $unchecked:ident,
        $nullable:ident,
        $nullable_unchecked:ident,
        $strict:ident,
        $nullable_strict:ident
    ) => {
        #[doc = concat!("Coercing read as `", stringify!($ty), "` with bounds/name check.")]
        fn $get<I: ColumnIndex>(&self, col: I) -> DbResult<$ty> {
            self.get(col)
        }

        #[doc = concat!("Coercing read as `", stringify!($ty), "` without any check.")]
        fn $unchecked(&self, index: usize) -> $ty {
            self.get_unchecked(index)
        }

        #[doc = concat!("Like [`Self::", stringify!($get), "`] but `None` for NULL.")]
        fn $nullable<I: ColumnIndex>(&self, col: I) -> DbResult<Option<$ty>> {
            self.get_nullable(col)
        }

        #[doc = concat!("Like [`Self::", stringify!($unchecked), "`] but `None` for NULL.")]
        fn $nullable_unchecked(&self, index: usize) -> Option<$ty> {
            self.get_nullable_unchecked(index)
        }

        #[doc = concat!("Strict read as `", stringify!($ty), "`; NULL is a mismatch.")]
        fn $strict<I: ColumnIndex>(&self, col: I) -> DbResult<$ty> {
            self.get_strict(col)
        }

        #[doc = concat!("Strict read as `", stringify!($ty), "`; `None` for NULL.")]
        fn $nullable_strict<I: ColumnIndex>(&self, col: I) -> DbResult<Option<$ty>> {
            self.get_nullable_strict(col)
        }
    };
}

/// Typed accessors over any [`Cursor`].
pub trait ColumnAccess: Cursor {
    /// Coercing read with no bounds or type validation.
    fn get_unchecked<T: FromColumn>(&self, index: usize) -> T {
        T::read_column(self, index)
    }

    /// Coercing read; `None` for NULL without invoking the coercion.
    fn get_nullable_unchecked<T: FromColumn>(&self, index: usize) -> Option<T> {
        if self.storage_class(index) == StorageClass::Null {
            None
        } else {
            Some(T::read_column(self, index))
        }
    }

    /// Coercing read of a validated ordinal or a known name.
    fn get<T: FromColumn, I: ColumnIndex>(&self, col: I) -> DbResult<T> {
        let index = col.resolve(self)?;
        Ok(self.get_unchecked(index))
    }

    /// Coercing read; `None` for NULL.
    fn get_nullable<T: FromColumn, I: ColumnIndex>(&self, col: I) -> DbResult<Option<T>> {
        let index = col.resolve(self)?;
        Ok(self.get_nullable_unchecked(index))
    }

    /// Non-coercing read; fails unless the cell is stored as `T`'s class.
    fn get_strict<T: FromColumn, I: ColumnIndex>(&self, col: I) -> DbResult<T> {
        let index = col.resolve(self)?;
        let actual = self.storage_class(index);
        if actual != T::STORAGE_CLASS {
            return Err(DbError::TypeMismatch {
                expected: T::STORAGE_CLASS,
                actual,
                column: col.column_ref(),
            });
        }
        Ok(T::read_column(self, index))
    }

    /// Non-coercing read; `None` for NULL, fails for any other class.
    fn get_nullable_strict<T: FromColumn, I: ColumnIndex>(&self, col: I) -> DbResult<Option<T>> {
        let index = col.resolve(self)?;
        match self.storage_class(index) {
            StorageClass::Null => Ok(None),
            actual if actual == T::STORAGE_CLASS => Ok(Some(T::read_column(self, index))),
            actual => Err(DbError::TypeMismatch {
                expected: T::STORAGE_CLASS,
                actual,
                column: col.column_ref(),
            }),
        }
    }

    /// Reads the cell as whatever it is stored as.
    fn get_value<I: ColumnIndex>(&self, col: I) -> DbResult<Value> {
        let index = col.resolve(self)?;
        Ok(match self.storage_class(index) {
            StorageClass::Integer => Value::Integer(self.raw_int64(index)),
            StorageClass::Float => Value::Float(self.raw_double(index)),
            StorageClass::Text => Value::Text(self.raw_text(index)),
            StorageClass::Blob => Value::Blob(self.raw_blob(index)),
            StorageClass::Null => Value::Null,
        })
    }

    /// Ordinal of the column called `name`.
    fn column_ordinal(&self, name: &str) -> DbResult<usize> {
        name.resolve(self)
    }

    /// All result column names in order.
    fn column_names(&self) -> Vec<String> {
        (0..self.column_count())
            .map(|i| self.column_name(i).unwrap_or_default())
            .collect()
    }

    typed_accessors!(
        i32,
        get_int,
        get_int_unchecked,
        get_nullable_int,
        get_nullable_int_unchecked,
        get_int_strict,
        get_nullable_int_strict
    );
    typed_accessors!(
        i64,
        get_int64,
        get_int64_unchecked,
        get_nullable_int64,
        get_nullable_int64_unchecked,
        get_int64_strict,
        get_nullable_int64_strict
    );
    typed_accessors!(
        f64,
        get_double,
        get_double_unchecked,
        get_nullable_double,
        get_nullable_double_unchecked,
        get_double_strict,
        get_nullable_double_strict
    );
    typed_accessors!(
        String,
        get_text,
        get_text_unchecked,
        get_nullable_text,
        get_nullable_text_unchecked,
        get_text_strict,
        get_nullable_text_strict
    );
    typed_accessors!(
        Vec<u8>,
        get_blob,
        get_blob_unchecked,
        get_nullable_blob,
        get_nullable_blob_unchecked,
        get_blob_strict,
        get_nullable_blob_strict
    );
}

impl<C: Cursor + ?Sized> ColumnAccess for C {}
