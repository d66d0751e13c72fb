use crate::error::RenderError;

pub const DRIVE_PATH: &str = "$DRIVE_PATH";
pub const RUN_TIME: &str = "$RUN_TIME";
pub const INFO: &str = "$INFO";
pub const ATTRIBUTES: &str = "$ATTRIBUTES";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode { Lenient, Strict }

/// Replaces every token occurrence in a single left-to-right pass. Replacement text
/// is copied through untouched, so a value containing `$INFO` stays literal.
/// Strict mode requires each token to appear exactly once.
pub fn substitute(template: &str, pairs: &[(&str, &str)], mode: Mode) -> Result<String, RenderError> {
    if let Some((tok, _)) = pairs.iter().find(|(tok, _)| tok.len() < 2 || !tok.starts_with('$')) {
        return Err(RenderError::Template(format!("invalid placeholder {:?}: must be `$` followed by a name", tok)));
    }
    let mut out = String::with_capacity(template.len() + pairs.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut hits = vec![0usize; pairs.len()];
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        // longest token wins so `$INFO` never shadows a longer `$INFO_X`
        let hit = pairs.iter().enumerate()
            .filter(|(_, (tok, _))| tail.starts_with(tok))
            .max_by_key(|(_, (tok, _))| tok.len());
        match hit {
            Some((i, (tok, val))) => {
                out.push_str(val);
                hits[i] += 1;
                rest = &tail[tok.len()..];
            }
            None => {
                out.push('$');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    if mode == Mode::Strict {
        for ((tok, _), n) in pairs.iter().zip(&hits) {
            if *n != 1 { return Err(RenderError::Template(format!("expected {} exactly once, found {}", tok, n))); }
        }
    }
    for ((tok, _), n) in pairs.iter().zip(&hits) {
        if *n == 0 { log::warn!("Template has no {} placeholder", tok); }
    }
    Ok(out)
}
