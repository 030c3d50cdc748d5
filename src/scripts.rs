//! The DOM-probe script registry.
//!
//! These are the *only* escape hatches into the assistant UI: every script
//! below is a verbatim JS string shipped to `Runtime.evaluate`, and the core
//! never parses HTML itself — only the typed/opaque JSON each script
//! returns, per its documented return schema.

/// Returns `{ isGenerating: bool }` by checking for the stop-generation
/// affordance in the assistant UI.
pub const STOP_BUTTON_PROBE: &str = r"(() => {
  const stopButton = document.querySelector('[data-testid=\"stop-generating\"], button[aria-label*=\"Stop\" i]');
  return JSON.stringify({ isGenerating: !!stopButton });
})()";

/// Returns a bare `bool`: whether a quota-exhaustion banner is visible.
pub const QUOTA_PROBE: &str = r"(() => {
  const banner = document.querySelector('[data-testid=\"quota-exceeded\"], .quota-banner');
  return !!banner;
})()";

/// Structured text extraction: `{ source, extractedAt, segments: [...] }`,
/// where each segment is `{ kind, text, messageIndex, domPath }` and `kind`
/// is one of `assistant-body | thinking | tool-call | tool-result | feedback`.
pub const STRUCTURED_TEXT_PROBE: &str = r#"(() => {
  const segments = [];
  const nodes = document.querySelectorAll('[data-message-segment]');
  nodes.forEach((node, i) => {
    segments.push({
      kind: node.getAttribute('data-segment-kind') || 'assistant-body',
      text: node.textContent || '',
      messageIndex: i,
      domPath: node.getAttribute('data-dom-path') || '',
    });
  });
  return JSON.stringify({
    source: 'structured',
    extractedAt: Date.now(),
    segments,
  });
})()"#;

/// Legacy text extraction: a single text string via a scored selector walk.
/// Returned as a bare string (not JSON-wrapped).
pub const LEGACY_TEXT_PROBE: &str = r"(() => {
  const candidates = document.querySelectorAll('[data-testid=\"assistant-response\"], .response-body, .message-content');
  let best = null;
  let bestScore = -1;
  candidates.forEach((el) => {
    const score = (el.textContent || '').length;
    if (score > bestScore) {
      bestScore = score;
      best = el;
    }
  });
  return best ? (best.textContent || '') : '';
})()";

/// Returns a JSON array of short strings (tool calls, "Reading …", etc.)
/// when structured extraction didn't already supply activity lines.
pub const PROCESS_LOG_PROBE: &str = r"(() => {
  const lines = document.querySelectorAll('[data-testid=\"process-log-line\"]');
  return JSON.stringify(Array.from(lines).map((el) => el.textContent || ''));
})()";

/// Clicks the stop-generation button, if present. Returns
/// `{ ok, method?, err? }`.
pub const CLICK_STOP_BUTTON: &str = r#"(() => {
  const btn = document.querySelector('[data-testid="stop-generating"], button[aria-label*="Stop" i]');
  if (!btn) return JSON.stringify({ ok: false, err: 'stop button not found' });
  btn.click();
  return JSON.stringify({ ok: true, method: 'click' });
})()"#;

/// Clicks a button matched by its visible text (case-insensitive substring),
/// optionally scoped by a `titleHint` on an ancestor card. Returns
/// `{ ok, method?, err? }`. Shared by approval/planning/error-popup actions.
#[must_use]
pub fn click_by_text(button_text: &str) -> String {
    let escaped = button_text.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        r"(() => {{
  const target = '{escaped}'.toLowerCase();
  const candidates = Array.from(document.querySelectorAll('button'));
  const btn = candidates.find((el) => (el.textContent || '').trim().toLowerCase().includes(target));
  if (!btn) return JSON.stringify({{ ok: false, err: 'button not found: ' + '{escaped}' }});
  btn.click();
  return JSON.stringify({{ ok: true, method: 'click' }});
}})()"
    )
}

/// Approval-popup probe: returns `null` or `{ buttonText, description }`.
pub const APPROVAL_PROBE: &str = r"(() => {
  const card = document.querySelector('[data-testid=\"approval-request\"]');
  if (!card) return null;
  const button = card.querySelector('button[data-action=\"allow\"]');
  const description = card.querySelector('[data-testid=\"approval-description\"]');
  return JSON.stringify({
    buttonText: button ? (button.textContent || '').trim() : 'Allow',
    description: description ? (description.textContent || '').trim() : '',
  });
})()";

/// Planning-dialog probe: same shape as `APPROVAL_PROBE`.
pub const PLANNING_PROBE: &str = r"(() => {
  const card = document.querySelector('[data-testid=\"planning-dialog\"]');
  if (!card) return null;
  const button = card.querySelector('button[data-action=\"open\"]');
  const description = card.querySelector('[data-testid=\"planning-summary\"]');
  return JSON.stringify({
    buttonText: button ? (button.textContent || '').trim() : 'Open',
    description: description ? (description.textContent || '').trim() : '',
  });
})()";

/// Extracts full plan content from an open planning dialog.
pub const EXTRACT_PLAN_CONTENT: &str = r"(() => {
  const card = document.querySelector('[data-testid=\"planning-dialog\"]');
  const body = card ? card.querySelector('[data-testid=\"planning-body\"]') : null;
  return body ? (body.textContent || '') : '';
})()";

/// Error-popup probe: returns `null` or `{ title, body }` (body truncated by
/// the caller to the first 100 chars for keying).
pub const ERROR_POPUP_PROBE: &str = r"(() => {
  const card = document.querySelector('[data-testid=\"error-popup\"]');
  if (!card) return null;
  const title = card.querySelector('[data-testid=\"error-title\"]');
  const body = card.querySelector('[data-testid=\"error-body\"]');
  return JSON.stringify({
    title: title ? (title.textContent || '').trim() : '',
    body: body ? (body.textContent || '').trim() : '',
  });
})()";

/// Opens the "Past Conversations" panel — the second-strategy session
/// activation fallback used when the target session isn't visible in the
/// direct side-panel listing.
pub const OPEN_PAST_CONVERSATIONS: &str = r#"(() => {
  const btn = document.querySelector('[data-testid="past-conversations-button"]');
  if (!btn) return JSON.stringify({ ok: false, err: 'past conversations button not found' });
  btn.click();
  return JSON.stringify({ ok: true });
})()"#;

/// Reads the clipboard via `navigator.clipboard.readText()`. Requires
/// `awaitPromise=true` on the `Runtime.evaluate` call. On denial the promise
/// rejects; the caller treats that as "return None and carry on", not retry.
pub const READ_CLIPBOARD: &str = "navigator.clipboard.readText()";

/// User-message bubble probe: returns `null` or `{ text }` for the latest
/// user-authored bubble in the conversation.
pub const USER_MESSAGE_PROBE: &str = r"(() => {
  const bubbles = document.querySelectorAll('[data-testid=\"user-message\"]');
  if (bubbles.length === 0) return null;
  const last = bubbles[bubbles.length - 1];
  return JSON.stringify({ text: (last.textContent || '').trim() });
})()";

/// Injects `text` into the prompt composer and submits it. Does not use
/// synthetic `input`/`change` events for file attachments — those are
/// dispatched internally by the upload primitive
/// (`DOM.setFileInputFiles`), not by this script.
#[must_use]
pub fn inject_message_script(text: &str) -> String {
    let encoded = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_owned());
    format!(
        r"(() => {{
  const composer = document.querySelector('[data-testid=\"prompt-composer\"]');
  if (!composer) return JSON.stringify({{ ok: false, err: 'composer not found' }});
  composer.focus();
  document.execCommand('insertText', false, {encoded});
  const submit = document.querySelector('[data-testid=\"prompt-submit\"]');
  if (!submit) return JSON.stringify({{ ok: false, err: 'submit button not found' }});
  submit.click();
  return JSON.stringify({{ ok: true }});
}})()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_by_text_escapes_quotes() {
        let script = click_by_text("Don't Allow");
        assert!(script.contains("Don\\'t Allow"));
    }

    #[test]
    fn inject_message_script_encodes_text_as_json() {
        let script = inject_message_script("hello \"world\"");
        assert!(script.contains(r#""hello \"world\"""#));
    }

    #[test]
    fn all_probes_are_nonempty() {
        assert!(!STOP_BUTTON_PROBE.is_empty());
        assert!(!QUOTA_PROBE.is_empty());
        assert!(!STRUCTURED_TEXT_PROBE.is_empty());
        assert!(!LEGACY_TEXT_PROBE.is_empty());
        assert!(!PROCESS_LOG_PROBE.is_empty());
        assert!(!APPROVAL_PROBE.is_empty());
        assert!(!PLANNING_PROBE.is_empty());
        assert!(!ERROR_POPUP_PROBE.is_empty());
        assert!(!USER_MESSAGE_PROBE.is_empty());
        assert!(!READ_CLIPBOARD.is_empty());
    }
}
