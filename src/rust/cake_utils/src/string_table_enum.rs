/// Declares a closed set of keywords as an enum, with a lookup from the
/// textual token. Dashes in the token are matched as underscores, so
/// `dual-srchost` maps onto the `dual_srchost` variant. Anything outside
/// the set is `Unknown`.
#[macro_export]
macro_rules! string_table_enum {
    ($enum_name: ident, $($option:ident),*) => {
        #[derive(Debug, PartialEq, Eq, Clone, Copy)]
        #[allow(non_camel_case_types)]
        pub(crate) enum $enum_name {
            $($option, )*
            Unknown
        }

        impl $enum_name {
            #[allow(unused)]
            pub(crate) fn from_str(s: &str) -> Self {
                match s.replace("-", "_").as_str() {
                    $(
                        stringify!($option) => Self::$option,
                    )*
                    _ => Self::Unknown
                }
            }

            #[allow(unused)]
            pub(crate) fn is_known(s: &str) -> bool {
                Self::from_str(s) != Self::Unknown
            }
        }

        impl Default for $enum_name {
            fn default() -> Self { Self::Unknown }
        }
    };
}

#[cfg(test)]
mod test {
    string_table_enum!(MyEnum, option1, option2);
    string_table_enum!(DashingEnum, option_1, option2);

    #[test]
    fn test_enum_creation() {
        let n = MyEnum::from_str("option1");
        assert_eq!(n, MyEnum::option1);
    }

    #[test]
    fn test_enum_unknown() {
        let n = MyEnum::from_str("i want sausages");
        assert_eq!(n, MyEnum::Unknown);
        assert!(!MyEnum::is_known("i want sausages"));
    }

    #[test]
    fn test_enum_with_dash() {
        let n = DashingEnum::from_str("option-1");
        assert_eq!(n, DashingEnum::option_1);
    }
}
