//! Radix tree nodes.

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::params::Params;
use crate::template::Segment;

/// A node in the route tree. Static children are kept sorted for binary search;
/// each node has at most one parameter child.
#[derive(Debug, Clone)]
pub struct Node {
    segment: String,
    param: Option<String>,
    methods: MethodRouter,
    static_children: Vec<Node>,
    param_child: Option<Box<Node>>,
}

impl Node {
    fn new_static(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            param: None,
            methods: MethodRouter::new(),
            static_children: Vec::new(),
            param_child: None,
        }
    }

    fn new_param(name: &str) -> Self {
        Self {
            segment: format!("[{name}]"),
            param: Some(name.to_string()),
            ..Self::new_static("")
        }
    }

    /// Creates the root node.
    #[must_use]
    pub fn root() -> Self {
        Self::new_static("")
    }

    /// Returns the node for `segments`, creating intermediate nodes as needed.
    pub(crate) fn descend_or_create(
        &mut self,
        segments: &[Segment],
        template: &str,
    ) -> Result<&mut Node, RouteError> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(self);
        };

        let child = match first {
            Segment::Static(text) => {
                let idx = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(text))
                {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.static_children.insert(idx, Node::new_static(text));
                        idx
                    }
                };
                &mut self.static_children[idx]
            }
            Segment::Param(name) => {
                let child = self
                    .param_child
                    .get_or_insert_with(|| Box::new(Node::new_param(name)));
                if let Some(existing) = child.param.as_deref() {
                    if existing != name {
                        return Err(RouteError::ParamConflict {
                            template: template.to_string(),
                            existing: existing.to_string(),
                            found: name.clone(),
                        });
                    }
                }
                child.as_mut()
            }
        };

        child.descend_or_create(rest, template)
    }

    pub(crate) fn methods_mut(&mut self) -> &mut MethodRouter {
        &mut self.methods
    }

    /// Matches a request path, filling `params` with captured segments.
    ///
    /// Static children win over the parameter child; if the static branch
    /// dead-ends the parameter branch is tried with `params` rolled back.
    pub(crate) fn match_segments<'a>(
        &'a self,
        segments: &[&str],
        params: &mut Params,
    ) -> Option<&'a MethodRouter> {
        let Some((first, rest)) = segments.split_first() else {
            return (!self.methods.is_empty()).then_some(&self.methods);
        };

        if let Ok(idx) = self
            .static_children
            .binary_search_by(|c| c.segment.as_str().cmp(first))
        {
            if let Some(found) = self.static_children[idx].match_segments(rest, params) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param_child {
            if let Some(name) = &child.param {
                let mark = params.len();
                params.push(name.clone(), *first);
                if let Some(found) = child.match_segments(rest, params) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }

        None
    }
}
