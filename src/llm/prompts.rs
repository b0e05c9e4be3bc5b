use crate::models::{Role, EDGE_STYLE, GRAPH_MODEL_OPEN, XML_DECLARATION};
use crate::schema::{GROUP_PADDING, SIBLING_SPACING};

/// System prompt for the planner (first stage)
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are the first step of a pipeline that turns architecture descriptions into draw.io diagrams.

Restate the user's description as unambiguous, structured instructions for the engineer who will draw it.

Your output MUST contain these sections:

## Components
One line per component: a short unique name, its kind (user/ui, module, database, external api, queue, monitoring, llm) and which group it belongs to (if any).

## Groups
One line per container box: its name and the components it encloses.

## Connections
One line per arrow: `source -> target`, using the component names exactly as listed above.

## Layout
The flow direction (left-to-right or top-to-bottom) and any placement hints.

RULES:
- Do not invent components that the description does not imply.
- Every connection must name two listed components.
- Do not output XML."#;

/// Build the user prompt for the planner
pub fn build_plan_prompt(user_prompt: &str) -> String {
    format!(
        "Architecture description:\n\n{}\n\nWrite the structured drawing instructions.",
        user_prompt.trim()
    )
}

/// The style catalog rendered as a prompt section
fn style_catalog_section() -> String {
    let mut section = String::new();
    for role in Role::ALL {
        section.push_str(&format!("- {}: `{}`\n", role.description(), role.style()));
    }
    section.push_str(&format!("- Edges/Arrows: `{}`\n", EDGE_STYLE));
    section
}

/// Document grammar shared by the generator and fixer prompts
fn grammar_section() -> String {
    format!(
        r#"1. Header - begin exactly with:
   {decl}
   {model}
   <root>
2. Base cells - must include exactly:
   <mxCell id="0"/>
   <mxCell id="1" parent="0"/>
3. Vertices:
   <mxCell id="..." value="..." style="..." vertex="1" parent="..."><mxGeometry x="..." y="..." width="..." height="..." as="geometry"/></mxCell>
   - ids are integers, start at 2 and increase by one with no gaps.
   - `value` must not be empty. Escape & as &amp;, < as &lt;, > as &gt;, " as &quot;.
   - `parent` is "1", a layer id or the id of the enclosing group. Never "0".
   - x and y are integers >= 0; width and height are positive integers.
4. Groups are vertices with the Groups/Containers style. Their children reference the group as `parent`.
   Use absolute page coordinates for children. The group's geometry must be the bounding box of its children
   expanded by {pad} on every side.
5. Edges:
   <mxCell id="..." style="..." edge="1" parent="1" source="..." target="..."><mxGeometry relative="1" as="geometry"/></mxCell>
   - Edge ids continue after the last vertex id.
   - `source` and `target` must be ids of existing vertices.
   - Edges have no `value`.
6. End with:
   </root>
   </mxGraphModel>"#,
        decl = XML_DECLARATION,
        model = GRAPH_MODEL_OPEN,
        pad = GROUP_PADDING,
    )
}

/// Build the system prompt for the generator (second stage)
pub fn build_generator_system_prompt() -> String {
    format!(
        r#"You are a precise draw.io XML generation engine. Convert the instructions into one valid draw.io diagram.

OUTPUT REQUIREMENTS:
- Output only raw XML. No explanations, no markdown, no comments.
- Do not add an xmlns attribute.

DOCUMENT STRUCTURE:
{grammar}

STYLES - every style attribute must be copied byte for byte from this list:
{catalog}
LAYOUT:
- Keep at least {spacing} pixels between nodes.
- Use one consistent flow: left-to-right or top-to-bottom.
- No two nodes with the same parent may overlap."#,
        grammar = grammar_section(),
        catalog = style_catalog_section(),
        spacing = SIBLING_SPACING,
    )
}

/// Build the user prompt for the generator
///
/// `feedback` describes why the previous attempt was rejected, if there was one.
pub fn build_generate_prompt(instructions: &str, feedback: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str("## Instructions\n");
    prompt.push_str(instructions.trim());
    prompt.push_str("\n\n");

    if let Some(feedback) = feedback {
        prompt.push_str("## Previous attempt\n");
        prompt.push_str("Your previous output was rejected: ");
        prompt.push_str(feedback);
        prompt.push_str("\nProduce a complete, well-formed document this time.\n\n");
    }

    prompt.push_str("Generate the draw.io XML for this diagram.");
    prompt
}

/// Build the system prompt for the fixer (third stage)
pub fn build_fixer_system_prompt() -> String {
    format!(
        r#"You are a fixer for draw.io XML diagrams. You receive possibly invalid, incomplete or chatty output and return the corrected diagram.

RULES:
- Do not explain anything. Return only the fixed raw XML.
- Remove markdown code fences and any text before or after the XML.
- Remove any xmlns attribute from <mxGraphModel>.
- Enforce this structure:
{grammar}

CORRECTIONS YOU MUST MAKE:
- Renumber ids so vertices use 2..N and edges continue after them, updating every source, target and parent.
- Replace every style that is not in the list below with the entry for the same kind of shape; remove cells whose kind cannot be determined.
- Replace empty vertex values with a short descriptive name; remove any value from edges.
- Remove edges whose source or target does not exist.
- Set missing parent attributes to "1"; a vertex may never have parent "0".
- Make x and y non-negative integers and width and height positive integers.
- Recompute every group's geometry as the bounding box of its children plus {pad} on every side; remove empty groups.
- Escape & < > " inside attribute values.

VALID STYLES:
{catalog}"#,
        grammar = grammar_section(),
        catalog = style_catalog_section(),
        pad = GROUP_PADDING,
    )
}

/// Build the user prompt for the fixer
pub fn build_fix_prompt(candidate: &str) -> String {
    format!("Fix the following draw.io XML:\n\n{}", candidate.trim())
}
