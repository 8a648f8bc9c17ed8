//! HTML rendering for the upload form and the verification result.

use base64::Engine as _;
use facematch_core::{ImageKind, Verification};

pub const TITLE: &str = "👨‍🦱 Face Matching App 🔮";
pub const SUBTITLE: &str = "🎯 DeepLearning Project 🎲";

pub const USE_CASES: [&str; 7] = [
    "ID Verification",
    "Face Recognition",
    "Access Control",
    "Emotion Analysis",
    "Social Media Tagging",
    "Surveillance",
    "Attendance System",
];

pub const SAME_PERSON: &str = "The images are of the same person!";
pub const DIFFERENT_PERSON: &str = "The images are NOT of the same person!";

const STYLE: &str = "\
body{font-family:system-ui,sans-serif;max-width:56rem;margin:2rem auto;padding:0 1rem;color:#262730}\
h1{margin:.2rem 0}\
.alert{padding:.8rem 1rem;border-radius:.4rem;margin:1rem 0}\
.success{background:#dff5e3;color:#0f5132}\
.error{background:#fde2e2;color:#842029}\
.detail{font-size:.85rem;opacity:.8}\
.columns{display:flex;gap:1rem}\
.columns figure{flex:1;margin:0}\
.columns img{width:100%;height:auto}\
figcaption{text-align:center;font-size:.9rem;color:#666}\
label{display:block;margin:.8rem 0 .3rem;font-weight:600}\
button{margin-top:1rem;padding:.5rem 1.2rem}";

/// An uploaded image kept for display next to the result.
pub struct DisplayImage<'a> {
    pub bytes: &'a [u8],
    pub kind: ImageKind,
}

/// What to show below the form.
pub enum Outcome<'a> {
    None,
    Error {
        message: &'a str,
        detail: Option<&'a str>,
    },
    Result {
        verification: &'a Verification,
        source: DisplayImage<'a>,
        comparison: DisplayImage<'a>,
    },
}

/// The form page with the given outcome section.
pub fn render(outcome: &Outcome<'_>) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
    html.push_str("<title>Face Matching App</title><style>");
    html.push_str(STYLE);
    html.push_str("</style></head><body>");

    html.push_str(&format!("<h1>{TITLE}</h1><h1>{SUBTITLE}</h1>"));

    html.push_str("<h3>Use Cases</h3><ul>");
    for case in USE_CASES {
        html.push_str(&format!("<li><strong>{case}</strong></li>"));
    }
    html.push_str("</ul>");

    html.push_str(
        "<form method=\"post\" action=\"/verify\" enctype=\"multipart/form-data\">\
         <h3>Upload the 'Source' image</h3>\
         <label for=\"source\">Choose Source image...</label>\
         <input id=\"source\" type=\"file\" name=\"source\" accept=\".jpg,.jpeg,.png\">\
         <h3>Upload 'Comparison' image</h3>\
         <label for=\"comparison\">Choose Comparison image...</label>\
         <input id=\"comparison\" type=\"file\" name=\"comparison\" accept=\".jpg,.jpeg,.png\">\
         <div><button type=\"submit\">Check Identity</button></div>\
         </form>",
    );

    match outcome {
        Outcome::None => {}
        Outcome::Error { message, detail } => {
            html.push_str(&format!("<div class=\"alert error\">{}", escape(message)));
            if let Some(detail) = detail {
                html.push_str(&format!("<div class=\"detail\">{}</div>", escape(detail)));
            }
            html.push_str("</div>");
        }
        Outcome::Result {
            verification,
            source,
            comparison,
        } => render_result(&mut html, verification, source, comparison),
    }

    html.push_str("</body></html>");
    html
}

fn render_result(html: &mut String, v: &Verification, source: &DisplayImage<'_>, comparison: &DisplayImage<'_>) {
    let (class, message) = if v.verified {
        ("success", SAME_PERSON)
    } else {
        ("error", DIFFERENT_PERSON)
    };
    html.push_str(&format!("<div class=\"alert {class}\">{message}</div>"));
    html.push_str(&format!("<p>{}</p>", confidence_line(v.distance)));
    html.push_str(&format!(
        "<p class=\"detail\">metric {} · threshold {:.4} · model {} · {} ms</p>",
        v.metric,
        v.threshold,
        escape(&v.model),
        v.elapsed_ms
    ));

    html.push_str("<div class=\"columns\">");
    for (img, caption) in [(source, "First Image"), (comparison, "Second Image")] {
        html.push_str(&format!(
            "<figure><img src=\"{}\" alt=\"{caption}\"><figcaption>{caption}</figcaption></figure>",
            data_url(img)
        ));
    }
    html.push_str("</div>");
}

/// Distance shown to the user.
pub fn confidence_line(distance: f32) -> String {
    format!("Confidence Score: {distance:.4}")
}

fn data_url(img: &DisplayImage<'_>) -> String {
    format!(
        "data:{};base64,{}",
        img.kind.mime_type(),
        base64::engine::general_purpose::STANDARD.encode(img.bytes)
    )
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::DistanceMetric;

    fn verification(verified: bool, distance: f32) -> Verification {
        Verification {
            verified,
            distance,
            threshold: 0.68,
            metric: DistanceMetric::Cosine,
            model: "w600k_r50".into(),
            source_face: None,
            comparison_face: None,
            elapsed_ms: 42,
        }
    }

    #[test]
    fn test_index_has_form_and_use_cases() {
        let html = render(&Outcome::None);
        assert!(html.contains("name=\"source\""));
        assert!(html.contains("name=\"comparison\""));
        assert!(html.contains("Check Identity"));
        assert!(html.contains("accept=\".jpg,.jpeg,.png\""));
        for case in USE_CASES {
            assert!(html.contains(case), "missing use case {case}");
        }
        assert!(!html.contains("class=\"alert"));
    }

    #[test]
    fn test_error_is_escaped() {
        let html = render(&Outcome::Error {
            message: "Error processing images: <script>",
            detail: Some("a & b"),
        });
        assert!(html.contains("Error processing images: &lt;script&gt;"));
        assert!(html.contains("a &amp; b"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_same_person_result() {
        let v = verification(true, 0.25);
        let html = render(&Outcome::Result {
            verification: &v,
            source: DisplayImage { bytes: b"abc", kind: ImageKind::Png },
            comparison: DisplayImage { bytes: b"xyz", kind: ImageKind::Jpeg },
        });
        assert!(html.contains("alert success"));
        assert!(html.contains(SAME_PERSON));
        assert!(html.contains("Confidence Score: 0.2500"));
        assert!(html.contains("data:image/png;base64,YWJj"));
        assert!(html.contains("data:image/jpeg;base64,eHl6"));
        assert!(html.contains("First Image"));
        assert!(html.contains("Second Image"));
    }

    #[test]
    fn test_different_person_result() {
        let v = verification(false, 0.91);
        let html = render(&Outcome::Result {
            verification: &v,
            source: DisplayImage { bytes: b"a", kind: ImageKind::Png },
            comparison: DisplayImage { bytes: b"b", kind: ImageKind::Png },
        });
        assert!(html.contains("alert error"));
        assert!(html.contains(DIFFERENT_PERSON));
        assert!(html.contains("Confidence Score: 0.9100"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
