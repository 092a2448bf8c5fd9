//! 核心宏定义
//!
//! 提供统一的宏来减少配置代码的重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use scriptlink::impl_default;
///
/// struct MyStruct {
///     field1: u32,
///     field2: String,
/// }
///
/// impl_default!(MyStruct {
///     field1: 0,
///     field2: String::new(),
/// });
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

/// 用查找函数返回的字符串覆盖配置字段
///
/// 值无法解析时保留原值并记录警告。
///
/// 使用示例:
/// ```rust
/// use scriptlink::env_override;
///
/// let lookup = |key: &str| (key == "APP_PORT").then(|| "8080".to_string());
/// let mut port: u16 = 80;
/// env_override!(lookup, "APP_PORT" => port);
/// assert_eq!(port, 8080);
/// ```
#[macro_export]
macro_rules! env_override {
    ($lookup:expr, $($key:literal => $target:expr),+ $(,)?) => {
        $(
            if let Some(raw) = ($lookup)($key) {
                match raw.trim().parse() {
                    Ok(parsed) => $target = parsed,
                    Err(_) => $crate::__tracing::warn!(
                        target: "config",
                        key = $key,
                        value = %raw,
                        "ignoring unparsable override"
                    ),
                }
            }
        )+
    };
}
