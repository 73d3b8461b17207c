use std::io::{IsTerminal, Read};

/// Inline text wins; otherwise stdin is read unless it is a terminal.
pub fn read_prompt(inline: Option<&str>) -> std::io::Result<String> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    read_prompt_from(inline, interactive, stdin.lock())
}

pub fn read_prompt_from<R: Read>(
    inline: Option<&str>,
    interactive: bool,
    mut reader: R,
) -> std::io::Result<String> {
    if let Some(text) = inline.filter(|text| !text.is_empty()) {
        return Ok(text.to_string());
    }
    if interactive {
        return Ok(String::new());
    }
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}
