use serde::{Deserialize, Serialize};

/// Error for a string that names no variant of a `str_enum!` type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field} value: {value}")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(PipelineStage {
    Unauthenticated => "unauthenticated",
    Authenticated => "authenticated",
    DraftSubmitted => "draft_submitted",
    DraftEditable => "draft_editable",
    Finalized => "finalized",
    Idle => "idle",
});

// When the well-known fallback OTP is accepted alongside the generated one.
str_enum!(FallbackCodePolicy {
    Never => "never",
    WhenDeliveryFellBack => "when_delivery_fell_back",
    Always => "always",
});

impl Default for FallbackCodePolicy {
    fn default() -> Self {
        Self::WhenDeliveryFellBack
    }
}
