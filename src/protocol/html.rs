//! HTML pages sent in response bodies.
//!
//! Names and file contents are embedded as-is.

/// An entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Listing page. Each entry links to `base + "/" + name`; pass an empty
/// base for the root.
pub fn directory_page(base: &str, entries: &[ListingEntry]) -> String {
    let mut page = String::from("<html><body><h1>List of Directories: </h1><ul>");

    for entry in entries {
        if entry.is_dir {
            page.push_str(&format!(
                "<li><b><i><a href=\"{}/{}\">{}/</a></i></b></li>",
                base, entry.name, entry.name
            ));
        } else {
            page.push_str(&format!(
                "<li><a href=\"{}/{}\">{}</a></li>",
                base, entry.name, entry.name
            ));
        }
    }

    page.push_str("</ul></body></html>");
    page
}

/// Page embedding a text file's content.
pub fn text_page(name: &str, text: &str) -> String {
    format!(
        "<html><body><h1>Text File: {}</h1><p>{}</p></body></html>",
        name, text
    )
}

pub fn error_page(code: u16, message: &str) -> String {
    format!("<html><body><h1>{} {}</h1></body></html>", code, message)
}
