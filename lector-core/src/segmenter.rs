//! # Segmentador Markdown
//!
//! Decompõe o texto bruto de um livro/documento numa sequência **plana e ordenada** de
//! [`Segment`]s tipados. É a entrada do orquestrador: só os [`Segment::RawTextParagraph`]
//! passam pelo tokenizer; todo o resto atravessa o pipeline intacto.
//!
//! ## Etapas
//!
//! 1. **AST genérica** ([`parse_markdown_nodes`]): o CommonMark é lido pelo `comrak` e convertido
//!    em [`MarkdownNode`]s com `kind`, `raw`, `children` e `attrs`. Linhas em branco entre blocos
//!    viram nós `blank_line` (o `comrak` não os representa).
//! 2. **Mapeamento** ([`parse_node`], [`parse_paragraph`]): cada nó de topo vira um segmento.
//! 3. **Achatamento** ([`flatten_segments`]): os filhos de cada parágrafo sobem para o nível de
//!    topo e os `Empty` (títulos) somem.
//!
//! | Nó de topo    | Segmento                                      |
//! |---------------|-----------------------------------------------|
//! | `paragraph`   | filhos inline (texto, imagem, quebra, página) |
//! | `blank_line`  | `HardBreak`                                   |
//! | `block_code`  | `Block(código)`                               |
//! | `heading`     | `Empty` (descartado)                          |
//! | outro         | erro `UnrecognizedMarkdownNode`               |
//!
//! A ordem de saída é exatamente a ordem do documento: a numeração de parágrafos e sentenças
//! do orquestrador depende dela.
//!
//! ## Peculiaridade
//!
//! Um documento vazio produz `[HardBreak]`, não uma lista vazia.

use std::sync::OnceLock;

use comrak::nodes::{AstNode, NodeValue};
use comrak::{parse_document, Arena, ComrakOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LectorError, Result};

/// Unidade tipada de estrutura do documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Texto corrido de um parágrafo, ainda não tokenizado.
    RawTextParagraph(String),
    /// Imagem, com a URL de origem.
    Image(String),
    /// Quebra de linha simples dentro de um parágrafo.
    SoftBreak,
    /// Linha em branco entre blocos.
    HardBreak,
    /// Bloco de código, passado adiante sem tokenizar.
    Block(String),
    PageStart,
    PageEnd,
    /// Marcador de título; descartado no achatamento.
    Empty,
    /// Agrupamento intermediário; nunca aparece na saída de [`segment`].
    Paragraph(Vec<Segment>),
}

/// Atributos opcionais de um nó markdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttrs {
    pub url: Option<String>,
    pub info: Option<String>,
}

/// Nó da AST genérica produzida a partir do `comrak`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownNode {
    /// Tipo do nó: `paragraph`, `blank_line`, `text`, `codespan`, `image`...
    pub kind: String,
    pub raw: Option<String>,
    pub children: Option<Vec<MarkdownNode>>,
    pub attrs: Option<NodeAttrs>,
}

impl MarkdownNode {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    pub fn with_raw(mut self, raw: &str) -> Self {
        self.raw = Some(raw.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<MarkdownNode>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.attrs.get_or_insert_with(NodeAttrs::default).url = Some(url.to_string());
        self
    }

    fn raw_or_empty(&self) -> String {
        self.raw.clone().unwrap_or_default()
    }
}

/// CommonMark puro: sem tabelas nem tachado, que ficam como texto comum do parágrafo.
fn comrak_options() -> ComrakOptions<'static> {
    ComrakOptions::default()
}

fn page_marker() -> &'static Regex {
    static PAGE: OnceLock<Regex> = OnceLock::new();
    PAGE.get_or_init(|| Regex::new(r"^===page_(start|end)===$").expect("regex de página válida"))
}

/// Lê o markdown e devolve a lista de nós de topo, com os `blank_line` intercalados.
pub fn parse_markdown_nodes(text: &str) -> Vec<MarkdownNode> {
    let arena = Arena::new();
    let root = parse_document(&arena, text, &comrak_options());
    let lines: Vec<&str> = text.lines().collect();

    let mut nodes = Vec::new();
    // Próxima linha (1-based) ainda não coberta por nenhum bloco
    let mut next_line = 1;
    for child in root.children() {
        let (start, end) = {
            let ast = child.data.borrow();
            (ast.sourcepos.start.line, ast.sourcepos.end.line)
        };
        push_blank_run(&lines, next_line, start, &mut nodes);
        nodes.push(block_node(child));
        next_line = next_line.max(end + 1);
    }
    push_blank_run(&lines, next_line, lines.len() + 1, &mut nodes);

    if nodes.is_empty() {
        nodes.push(MarkdownNode::new("blank_line"));
    }
    nodes
}

/// Emite um único `blank_line` se o intervalo de linhas `[from, to)` tiver linha em branco.
fn push_blank_run(lines: &[&str], from: usize, to: usize, nodes: &mut Vec<MarkdownNode>) {
    let has_blank = (from..to).any(|n| {
        n >= 1 && lines.get(n - 1).is_some_and(|line| line.trim().is_empty())
    });
    if has_blank {
        nodes.push(MarkdownNode::new("blank_line"));
    }
}

fn block_node<'a>(node: &'a AstNode<'a>) -> MarkdownNode {
    let ast = node.data.borrow();
    match &ast.value {
        NodeValue::Paragraph => MarkdownNode::new("paragraph").with_children(inline_children(node)),
        NodeValue::Heading(_) => MarkdownNode::new("heading").with_children(inline_children(node)),
        NodeValue::CodeBlock(code) => {
            let mut block = MarkdownNode::new("block_code").with_raw(&code.literal);
            if !code.info.is_empty() {
                block.attrs = Some(NodeAttrs {
                    url: None,
                    info: Some(code.info.clone()),
                });
            }
            block
        }
        NodeValue::List(_) => MarkdownNode::new("list"),
        NodeValue::BlockQuote => MarkdownNode::new("block_quote"),
        NodeValue::ThematicBreak => MarkdownNode::new("thematic_break"),
        NodeValue::HtmlBlock(html) => MarkdownNode::new("block_html").with_raw(&html.literal),
        NodeValue::Table(_) => MarkdownNode::new("table"),
        _ => MarkdownNode::new("unknown"),
    }
}

/// Converte os filhos inline de um bloco, fundindo textos adjacentes.
fn inline_children<'a>(node: &'a AstNode<'a>) -> Vec<MarkdownNode> {
    let mut children: Vec<MarkdownNode> = Vec::new();
    for child in node.children() {
        let converted = inline_node(child);
        if let Some(previous) = children.last_mut() {
            if previous.kind == "text" && converted.kind == "text" {
                let merged = previous.raw_or_empty() + &converted.raw_or_empty();
                previous.raw = Some(merged);
                continue;
            }
        }
        children.push(converted);
    }
    children
}

fn inline_node<'a>(node: &'a AstNode<'a>) -> MarkdownNode {
    let ast = node.data.borrow();
    match &ast.value {
        NodeValue::Text(text) => MarkdownNode::new("text").with_raw(text),
        NodeValue::Code(code) => MarkdownNode::new("codespan").with_raw(&code.literal),
        NodeValue::SoftBreak => MarkdownNode::new("softbreak"),
        NodeValue::LineBreak => MarkdownNode::new("linebreak"),
        NodeValue::Image(link) => MarkdownNode::new("image")
            .with_url(&link.url)
            .with_children(inline_children(node)),
        NodeValue::Emph => MarkdownNode::new("emphasis").with_children(inline_children(node)),
        NodeValue::Strong => MarkdownNode::new("strong").with_children(inline_children(node)),
        NodeValue::Link(link) => MarkdownNode::new("link")
            .with_url(&link.url)
            .with_children(inline_children(node)),
        NodeValue::HtmlInline(html) => MarkdownNode::new("inline_html").with_raw(html),
        _ => MarkdownNode::new("unknown"),
    }
}

/// Mapeia um filho inline de parágrafo.
fn parse_child(child: &MarkdownNode) -> Result<Segment> {
    match child.kind.as_str() {
        "text" => {
            let raw = child.raw_or_empty();
            match page_marker().captures(raw.trim()) {
                Some(caps) if &caps[1] == "start" => Ok(Segment::PageStart),
                Some(_) => Ok(Segment::PageEnd),
                None => Ok(Segment::RawTextParagraph(raw)),
            }
        }
        // Texto entre crases é tratado como texto normal
        "codespan" => Ok(Segment::RawTextParagraph(child.raw_or_empty())),
        "softbreak" => Ok(Segment::SoftBreak),
        "image" => Ok(Segment::Image(
            child
                .attrs
                .as_ref()
                .and_then(|attrs| attrs.url.clone())
                .unwrap_or_default(),
        )),
        other => Err(LectorError::UnknownSegmentKind {
            kind: other.to_string(),
        }),
    }
}

/// Mapeia um parágrafo para [`Segment::Paragraph`] com seus filhos já convertidos.
pub fn parse_paragraph(paragraph: &MarkdownNode) -> Result<Segment> {
    let children = paragraph.children.as_deref().unwrap_or_default();
    let segments = children.iter().map(parse_child).collect::<Result<Vec<_>>>()?;
    Ok(Segment::Paragraph(segments))
}

/// Mapeia um nó de topo.
pub fn parse_node(node: &MarkdownNode) -> Result<Segment> {
    match node.kind.as_str() {
        "paragraph" => parse_paragraph(node),
        "blank_line" => Ok(Segment::HardBreak),
        "block_code" => Ok(Segment::Block(node.raw_or_empty())),
        "heading" => Ok(Segment::Empty),
        _ => Err(LectorError::UnrecognizedMarkdownNode {
            node: format!("{:?}", node),
        }),
    }
}

/// Sobe os filhos de cada parágrafo para o nível de topo e descarta os `Empty`.
pub fn flatten_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut flat = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Paragraph(children) => flat.extend(children),
            Segment::Empty => {}
            other => flat.push(other),
        }
    }
    flat
}

/// Segmenta o texto bruto. Função pura e determinística.
///
/// # Erros
/// - [`LectorError::UnrecognizedMarkdownNode`] para blocos não suportados (listas, citações...).
/// - [`LectorError::UnknownSegmentKind`] para filhos inline não suportados (ênfase, links...).
pub fn segment(raw_text: &str) -> Result<Vec<Segment>> {
    let segments = parse_markdown_nodes(raw_text)
        .iter()
        .map(parse_node)
        .collect::<Result<Vec<_>>>()?;
    Ok(flatten_segments(segments))
}
