//! Declarative macros for describing records and enumerations.
//!
//! The macros expand to plain trait impls at compile time: a static field
//! table for [`Record`](crate::mapping::Record) and ordinal/name conversions
//! for enumerations.

/// Implement [`Record`](crate::mapping::Record) for a struct.
///
/// Each listed field binds to a column with the same name (case-insensitive,
/// underscores ignored) unless an explicit column name is given. Every listed
/// field type must implement [`FromDbValue`](crate::models::FromDbValue).
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct Person {
///     person_id: i32,
///     name: String,
///     mobile: String,
///     address: Option<String>,
/// }
///
/// impl_record!(Person {
///     person_id,
///     name,
///     mobile => "MobileNo",
///     address,
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    (@column $field:ident, $column:literal) => {
        $column
    };
    (@column $field:ident) => {
        stringify!($field)
    };
    ($ty:ident { $($field:ident $(=> $column:literal)?),* $(,)? }) => {
        impl $crate::mapping::Record for $ty {
            fn fields() -> &'static [$crate::mapping::Field<Self>] {
                const FIELDS: &[$crate::mapping::Field<$ty>] = &[
                    $(
                        $crate::mapping::Field::new(
                            stringify!($field),
                            $crate::impl_record!(@column $field $(, $column)?),
                            |record: &mut $ty, value: $crate::models::DbValue| {
                                record.$field = $crate::mapping::convert(value)?;
                                ::core::result::Result::Ok(())
                            },
                        ),
                    )*
                ];
                FIELDS
            }
        }
    };
}

/// Make a fieldless enum convertible from database values.
///
/// Integer values map through the listed ordinals; text values match variant
/// names case-insensitively (numeric text falls back to the ordinal). The enum
/// also converts back into its ordinal for use as a parameter value.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default, Clone, Copy, PartialEq)]
/// enum Grade {
///     #[default]
///     Pass,
///     Merit,
///     Distinction,
/// }
///
/// impl_db_enum!(Grade { Pass = 0, Merit = 1, Distinction = 2 });
/// ```
#[macro_export]
macro_rules! impl_db_enum {
    ($ty:ident { $($variant:ident = $ordinal:literal),+ $(,)? }) => {
        impl $crate::models::FromDbValue for $ty {
            fn from_db_value(
                value: $crate::models::DbValue,
            ) -> ::core::result::Result<Self, $crate::models::ConversionError> {
                if let $crate::models::DbValue::Text(text) = &value {
                    let name = text.trim();
                    $(
                        if name.eq_ignore_ascii_case(stringify!($variant)) {
                            return ::core::result::Result::Ok(Self::$variant);
                        }
                    )+
                }
                let shown = match &value {
                    $crate::models::DbValue::Text(text) => text.clone(),
                    other => other.type_name().to_string(),
                };
                let ordinal =
                    <i64 as $crate::models::FromDbValue>::from_db_value(value).map_err(|_| {
                        $crate::models::ConversionError::Unparsable {
                            target: stringify!($ty),
                            value: shown,
                        }
                    })?;
                match ordinal {
                    $( $ordinal => ::core::result::Result::Ok(Self::$variant), )+
                    other => ::core::result::Result::Err($crate::models::ConversionError::OutOfRange {
                        target: stringify!($ty),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl From<$ty> for $crate::models::DbValue {
            fn from(value: $ty) -> Self {
                match value {
                    $( $ty::$variant => $crate::models::DbValue::Int($ordinal), )+
                }
            }
        }
    };
}
