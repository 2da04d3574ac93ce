// mm2batch: Batch alignment boundary codec and buffer ownership.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! Engine that replays fixed results, one entry per sequence in batch order.

use crate::engine::AlignmentEngine;
use crate::engine::EngineAlignment;
use crate::engine::EngineConfig;
use crate::index::Index;
use crate::options::MapOptions;

#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    pub results: Vec<Vec<EngineAlignment>>,
}

impl AlignmentEngine for ScriptedEngine {
    type Workspace = usize;

    fn workspace(
        &self,
        _config: &EngineConfig,
    ) -> usize {
        0
    }

    fn map(
        &self,
        _index: &Index,
        _seq: &[u8],
        _opts: &MapOptions,
        workspace: &mut usize,
    ) -> Vec<EngineAlignment> {
        let out = self.results.get(*workspace).cloned().unwrap_or_default();
        *workspace += 1;
        out
    }
}
