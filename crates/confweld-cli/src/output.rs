use confweld_core::value::Value;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Strings print bare; everything else prints as JSON.
pub fn print_value(value: &Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => println!("{s}"),
        other => print_json(other)?,
    }
    Ok(())
}
