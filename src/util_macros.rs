// Quick little util for stringly enums.
//
// The string of each variant is what gets printed into JavaScript (for operators) or into
// diagnostics (for type names).
macro_rules! string_enum {
    (
        $(#[$($Enum_attr:tt)+])*
        $vis:vis enum $Enum:ident {
            $(
                $(#[$($variant_attr:tt)+])* $Variant:ident,
            )*
        }
    ) => {
        $(#[$($Enum_attr)+])*
        #[derive(strum::Display, strum::EnumString, strum::IntoStaticStr)]
        $vis enum $Enum {
            $( $(#[$($variant_attr)+])* $Variant, )*
        }

        impl crate::js::fmt::Format for $Enum {
            fn fmt<W: ::std::io::Write>(&self, out: &mut crate::js::fmt::Formatter<W>) -> crate::js::fmt::Result {
                out.fmt(format_args!("{}", self))
            }
        }
    }
}
