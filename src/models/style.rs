use serde::{Deserialize, Serialize};

/// The single style every edge must carry
pub const EDGE_STYLE: &str = "edgeStyle=orthogonalEdgeStyle;rounded=0;orthogonalLoop=1;jettySize=auto;html=1;endArrow=block;strokeColor=#FFFFFF;endFill=1;";

/// Semantic role of a vertex - each role maps to exactly one catalog style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Users, front-ends, web apps
    User,
    /// Services, modules, business logic
    Logic,
    /// Storage drawn as an outlined cylinder
    DatabaseOutline,
    /// Storage drawn as a filled cylinder
    DatabaseFilled,
    /// Third-party services and external APIs
    ExternalApi,
    /// Queues, brokers, routers
    Queue,
    /// Monitoring, logging, tracking
    Monitoring,
    /// Language models
    LanguageModel,
    /// Visible container enclosing other vertices
    Group,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::User,
        Role::Logic,
        Role::DatabaseOutline,
        Role::DatabaseFilled,
        Role::ExternalApi,
        Role::Queue,
        Role::Monitoring,
        Role::LanguageModel,
        Role::Group,
    ];

    /// The catalog style string for this role
    pub fn style(self) -> &'static str {
        match self {
            Role::User => "shape=rectangle;whiteSpace=wrap;html=1;fillColor=#66B2FF;strokeColor=#0055CC;fontColor=#000000;",
            Role::Logic => "shape=rectangle;whiteSpace=wrap;html=1;fillColor=#66FF99;strokeColor=#00AA55;fontColor=#000000;",
            Role::DatabaseOutline => "shape=cylinder;whiteSpace=wrap;html=1;boundedLbl=1;backgroundOutline=1;size=15;fillColor=none;strokeColor=#FF6600;fontColor=#FFFFFF;",
            Role::DatabaseFilled => "shape=cylinder;whiteSpace=wrap;html=1;boundedLbl=1;backgroundOutline=1;size=15;fillColor=#FFB266;strokeColor=#FF6600;fontColor=#000000;",
            Role::ExternalApi => "shape=cloud;whiteSpace=wrap;html=1;fillColor=#CCCCCC;strokeColor=#666666;fontColor=#000000;",
            Role::Queue => "shape=rhombus;whiteSpace=wrap;html=1;fillColor=#FFF176;strokeColor=#FBC02D;fontColor=#000000;",
            Role::Monitoring => "shape=hexagon;perimeter=hexagonPerimeter2;whiteSpace=wrap;html=1;fillColor=#FF6666;strokeColor=#B22222;fontColor=#000000;",
            Role::LanguageModel => "shape=rectangle;whiteSpace=wrap;html=1;dashed=1;fillColor=#D966FF;strokeColor=#9900CC;fontColor=#000000;",
            Role::Group => "shape=rectangle;whiteSpace=wrap;html=1;dashed=1;fillColor=none;strokeColor=#FFFFFF;fontColor=#000000;noLabel=0;opacity=100;",
        }
    }

    /// Heading used for this role in prompts
    pub fn description(self) -> &'static str {
        match self {
            Role::User => "User/UI",
            Role::Logic => "Logic/Modules",
            Role::DatabaseOutline => "Databases (outline)",
            Role::DatabaseFilled => "Databases (filled)",
            Role::ExternalApi => "External APIs",
            Role::Queue => "Queues",
            Role::Monitoring => "Monitoring/Logging",
            Role::LanguageModel => "LLMs",
            Role::Group => "Groups/Containers",
        }
    }

    /// Label substituted when a vertex arrives without one
    pub fn display_name(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Logic => "Module",
            Role::DatabaseOutline | Role::DatabaseFilled => "Database",
            Role::ExternalApi => "External API",
            Role::Queue => "Queue",
            Role::Monitoring => "Monitoring",
            Role::LanguageModel => "LLM",
            Role::Group => "Group",
        }
    }

    /// Byte-exact catalog lookup
    pub fn from_catalog(style: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.style() == style)
    }

    fn fill_color(self) -> &'static str {
        StyleProps::parse(self.style()).get("fillColor").unwrap_or("none")
    }

    fn stroke_color(self) -> &'static str {
        StyleProps::parse(self.style()).get("strokeColor").unwrap_or("none")
    }
}

/// Key/value view of a `;`-separated style string
#[derive(Debug, Default)]
pub struct StyleProps<'a> {
    /// Leading token without `=` (draw.io shorthand for the shape)
    pub bare: Option<&'a str>,
    pub entries: Vec<(&'a str, &'a str)>,
}

impl<'a> StyleProps<'a> {
    pub fn parse(style: &'a str) -> Self {
        let mut props = StyleProps::default();
        for part in style.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((key, value)) => props.entries.push((key.trim(), value.trim())),
                None if props.bare.is_none() => props.bare = Some(part),
                None => {}
            }
        }
        props
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("1")
    }

    /// Shape keyword from `shape=` or the leading bare token
    pub fn shape(&self) -> Option<String> {
        self.get("shape")
            .or(self.bare)
            .map(|s| s.to_ascii_lowercase())
    }
}

/// Infer the semantic role of a vertex from an arbitrary style string
///
/// Exact catalog entries map directly. Otherwise the shape keyword decides the
/// family (a missing shape means draw.io's default rectangle) and the flags and
/// colours pick the role within it. Returns `None` when no role fits.
pub fn infer_role(style: &str) -> Option<Role> {
    if let Some(role) = Role::from_catalog(style) {
        return Some(role);
    }

    let props = StyleProps::parse(style);
    let shape = props.shape();
    let fill = props.get("fillColor").map(|c| c.to_ascii_lowercase());
    let no_fill = fill.as_deref() == Some("none");

    if props.flag("container") {
        return Some(Role::Group);
    }

    let Some(shape) = shape else {
        return Some(infer_rectangle_role(&props));
    };

    if shape.contains("swimlane") {
        Some(Role::Group)
    } else if shape.contains("cylinder") || shape.contains("database") || shape.contains("datastore") {
        if no_fill {
            Some(Role::DatabaseOutline)
        } else {
            Some(Role::DatabaseFilled)
        }
    } else if shape.contains("cloud") {
        Some(Role::ExternalApi)
    } else if shape.contains("rhombus") || shape.contains("queue") {
        Some(Role::Queue)
    } else if shape.contains("hexagon") {
        Some(Role::Monitoring)
    } else if shape.contains("actor") {
        Some(Role::User)
    } else if shape.starts_with("rect") || shape.contains("process") {
        Some(infer_rectangle_role(&props))
    } else {
        None
    }
}

/// Pick among the rectangle-shaped roles
fn infer_rectangle_role(props: &StyleProps<'_>) -> Role {
    let fill = props.get("fillColor").map(|c| c.to_ascii_lowercase());
    let stroke = props.get("strokeColor").map(|c| c.to_ascii_lowercase());
    let dashed = props.flag("dashed");

    if dashed && fill.as_deref() == Some("none") {
        return Role::Group;
    }

    const RECTANGLES: [Role; 3] = [Role::User, Role::Logic, Role::LanguageModel];
    for role in RECTANGLES {
        let fill_match = fill
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case(role.fill_color()));
        let stroke_match = stroke
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(role.stroke_color()));
        if fill_match || stroke_match {
            return role;
        }
    }

    if dashed {
        return Role::LanguageModel;
    }

    match fill.as_deref() {
        Some(c) if c.contains("blue") => Role::User,
        Some(c) if c.contains("purple") || c.contains("violet") || c.contains("magenta") => {
            Role::LanguageModel
        }
        _ => Role::Logic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_catalog(role.style()), Some(role));
            assert_eq!(infer_role(role.style()), Some(role));
        }
        assert_eq!(Role::from_catalog(EDGE_STYLE), None);
    }

    #[test]
    fn test_catalog_styles_are_distinct() {
        let mut styles: Vec<&str> = Role::ALL.iter().map(|r| r.style()).collect();
        styles.sort();
        styles.dedup();
        assert_eq!(styles.len(), Role::ALL.len());
    }

    #[test]
    fn test_misspelled_rectangle() {
        assert_eq!(infer_role("shape=rectangl;fillColor=blue"), Some(Role::User));
        assert_eq!(infer_role("shape=rect;fillColor=#ffffff"), Some(Role::Logic));
    }

    #[test]
    fn test_shape_keywords() {
        assert_eq!(infer_role("shape=cylinder3;fillColor=#123456"), Some(Role::DatabaseFilled));
        assert_eq!(infer_role("shape=cylinder;fillColor=none"), Some(Role::DatabaseOutline));
        assert_eq!(infer_role("ellipse;shape=cloud;whiteSpace=wrap"), Some(Role::ExternalApi));
        assert_eq!(infer_role("rhombus;whiteSpace=wrap;html=1;"), Some(Role::Queue));
        assert_eq!(infer_role("shape=hexagon;perimeter=hexagonPerimeter2"), Some(Role::Monitoring));
        assert_eq!(infer_role("shape=umlActor;verticalLabelPosition=bottom"), Some(Role::User));
        assert_eq!(infer_role("swimlane;startSize=20"), Some(Role::Group));
    }

    #[test]
    fn test_rectangle_family_flags() {
        assert_eq!(infer_role("rounded=1;whiteSpace=wrap;html=1;"), Some(Role::Logic));
        assert_eq!(infer_role("shape=rectangle;dashed=1;fillColor=none"), Some(Role::Group));
        assert_eq!(infer_role("shape=rectangle;dashed=1;fillColor=#ff00ff"), Some(Role::LanguageModel));
        assert_eq!(infer_role("fillColor=#66b2ff"), Some(Role::User));
        assert_eq!(infer_role("whiteSpace=wrap;container=1"), Some(Role::Group));
    }

    #[test]
    fn test_group_catalog_entry() {
        let style = "shape=rectangle;whiteSpace=wrap;html=1;dashed=1;fillColor=none;strokeColor=#FFFFFF;fontColor=#000000;noLabel=0;opacity=100;";
        assert_eq!(Role::Group.style(), style);
        assert_eq!(Role::from_catalog(style), Some(Role::Group));
        assert_eq!(infer_role("shape=rectangle;dashed=1;fillColor=none;noLabel=0"), Some(Role::Group));
    }

    #[test]
    fn test_unrecoverable_shapes() {
        assert_eq!(infer_role("ellipse;whiteSpace=wrap;html=1;"), None);
        assert_eq!(infer_role("text;html=1;align=center"), None);
        assert_eq!(infer_role("shape=triangle"), None);
    }
}
