use crate::dom::{Document, NodeId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selectors {
    pub xpath: String,
    pub css_path: String,
}

pub fn compute_selectors(doc: &Document, node: NodeId) -> Selectors {
    Selectors {
        xpath: xpath(doc, node),
        css_path: css_path(doc, node),
    }
}

/// `//*[@id="x"]` for elements with an id, otherwise `tag[n]` steps up to the nearest
/// identified ancestor or to the root.
pub fn xpath(doc: &Document, node: NodeId) -> String {
    let mut steps: Vec<String> = Vec::new();
    let mut prefix = String::new();
    let mut current = Some(node);

    while let Some(n) = current {
        let el = doc.element(n);
        if let Some(id) = el.identifier() {
            prefix = format!("//*[@id=\"{id}\"]");
            break;
        }
        steps.push(format!("{}[{}]", el.tag, doc.ordinal_of_type(n)));
        current = doc.parent(n);
    }

    if steps.is_empty() {
        return prefix;
    }
    steps.reverse();
    format!("{prefix}/{}", steps.join("/"))
}

/// `a > b:nth-of-type(2) > c`, stopping at the first `tag#id`.
pub fn css_path(doc: &Document, node: NodeId) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(node);

    while let Some(n) = current {
        let el = doc.element(n);
        if let Some(id) = el.identifier() {
            parts.push(format!("{}#{id}", el.tag));
            break;
        }
        let nth = doc.ordinal_of_type(n);
        if nth == 1 {
            parts.push(el.tag.clone());
        } else {
            parts.push(format!("{}:nth-of-type({nth})", el.tag));
        }
        current = doc.parent(n);
    }

    parts.reverse();
    parts.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Rect;

    fn sample() -> (Document, Vec<NodeId>) {
        // html > body > [div, div#main > [span, p, span], div]
        let mut doc = Document::new();
        let html = doc.create_element("html", None, Rect::default());
        let body = doc.create_element("body", None, Rect::default());
        doc.append_child(html, body);
        let d1 = doc.create_element("div", None, Rect::default());
        let main = doc.create_element("div", Some("main"), Rect::default());
        let d3 = doc.create_element("div", None, Rect::default());
        for n in [d1, main, d3] {
            doc.append_child(body, n);
        }
        let s1 = doc.create_element("span", None, Rect::default());
        let p = doc.create_element("p", None, Rect::default());
        let s2 = doc.create_element("span", None, Rect::default());
        for n in [s1, p, s2] {
            doc.append_child(main, n);
        }
        (doc, vec![html, body, d1, main, d3, s1, p, s2])
    }

    #[test]
    fn identified_element_uses_id_forms() {
        let (doc, n) = sample();
        let sel = compute_selectors(&doc, n[3]);
        assert_eq!(sel.xpath, r#"//*[@id="main"]"#);
        assert_eq!(sel.css_path, "div#main");
    }

    #[test]
    fn id_forms_ignore_sibling_structure() {
        let mut doc = Document::new();
        let root = doc.create_element("section", None, Rect::default());
        for _ in 0..4 {
            let filler = doc.create_element("button", None, Rect::default());
            doc.append_child(root, filler);
        }
        let target = doc.create_element("button", Some("foo"), Rect::default());
        doc.append_child(root, target);

        let sel = compute_selectors(&doc, target);
        assert_eq!(sel.xpath, r#"//*[@id="foo"]"#);
        assert!(sel.css_path.ends_with("button#foo"));
    }

    #[test]
    fn absolute_path_without_ids() {
        let (doc, n) = sample();
        assert_eq!(xpath(&doc, n[4]), "/html[1]/body[1]/div[3]");
        assert_eq!(css_path(&doc, n[4]), "html > body > div:nth-of-type(3)");
        assert_eq!(css_path(&doc, n[2]), "html > body > div");
    }

    #[test]
    fn identified_ancestor_short_circuits() {
        let (doc, n) = sample();
        assert_eq!(xpath(&doc, n[7]), r#"//*[@id="main"]/span[2]"#);
        assert_eq!(css_path(&doc, n[7]), "div#main > span:nth-of-type(2)");
        assert_eq!(xpath(&doc, n[6]), r#"//*[@id="main"]/p[1]"#);
        assert_eq!(css_path(&doc, n[6]), "div#main > p");
    }

    #[test]
    fn empty_id_is_not_an_identifier() {
        let mut doc = Document::new();
        let root = doc.create_element("ul", None, Rect::default());
        let li = doc.create_element("li", Some(""), Rect::default());
        doc.append_child(root, li);
        assert_eq!(xpath(&doc, li), "/ul[1]/li[1]");
        assert_eq!(css_path(&doc, li), "ul > li");
    }

    #[test]
    fn detached_node_gives_short_path() {
        let mut doc = Document::new();
        let lone = doc.create_element("IMG", None, Rect::default());
        let sel = compute_selectors(&doc, lone);
        assert_eq!(sel.xpath, "/img[1]");
        assert_eq!(sel.css_path, "img");
    }

    #[test]
    fn selectors_are_deterministic() {
        let (doc, n) = sample();
        for &node in &n {
            assert_eq!(compute_selectors(&doc, node), compute_selectors(&doc, node));
        }
    }
}
