// Function mapping.
//
// The remote server has no user-defined functions, so portable function
// names are expanded into built-in SQLite expressions here. Names without a
// mapping are emitted as written.

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

/// Render `name(args)` for the SQLite dialect. `args` are already rendered.
pub fn render(name: &str, args: &[String]) -> String {
    let lower = name.to_ascii_lowercase();
    let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("NULL");

    match lower.as_str() {
        "contains" => format!("ifnull(instr({},{}),0)", arg(0), arg(1)),
        "startswith" => format!("coalesce(instr({},{})=1,false)", arg(0), arg(1)),
        "endswith" => format!(
            "coalesce(substr({},length({})+1-length({}))={},false)",
            arg(0),
            arg(0),
            arg(1),
            arg(1)
        ),
        "tolower" => format!("lower({})", arg(0)),
        "toupper" => format!("upper({})", arg(0)),
        "length" => format!("length({})", arg(0)),
        "indexof" => format!("(instr({},{}) - 1)", arg(0), arg(1)),
        "concat" => format!("({})", args.join(" || ")),
        "year" => date_part("%Y", arg(0)),
        "month" => date_part("%m", arg(0)),
        "day" => date_part("%d", arg(0)),
        "hour" => date_part("%H", arg(0)),
        "minute" => date_part("%M", arg(0)),
        "second" => date_part("%S", arg(0)),
        "average" => format!("avg({})", arg(0)),
        "countdistinct" => match args.first() {
            Some(expr) => format!("count(distinct {})", expr),
            None => "count(*)".to_string(),
        },
        "ceiling" => format!("ceil({})", arg(0)),
        "floor" => format!("floor({})", arg(0)),
        "now" | "current_timestamp" => NOW.to_string(),
        _ => format!("{}({})", name, args.join(",")),
    }
}

/// The server-side expression for the current instant.
pub fn now() -> &'static str {
    NOW
}

fn date_part(format: &str, expr: &str) -> String {
    format!("cast(strftime('{}',{}) as Integer)", format, expr)
}
