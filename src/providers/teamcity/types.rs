use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{Build, BuildRef, Change, ProblemOccurrence, TestOccurrence};

/// TeamCity timestamp layout, e.g. `20240301T080000+0000`.
const TEAMCITY_DATE_FORMAT: &str = "%Y%m%dT%H%M%S%z";

pub fn parse_teamcity_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, TEAMCITY_DATE_FORMAT)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRefJson {
    pub id: Option<i64>,
    pub build_type_id: Option<String>,
    pub branch_name: Option<String>,
    pub href: Option<String>,
    pub status: Option<String>,
    pub state: Option<String>,
}

impl BuildRefJson {
    pub fn into_model(self) -> BuildRef {
        let Some(id) = self.id else {
            return BuildRef::fake_stub();
        };

        let href = self.href.unwrap_or_else(|| build_href(id));
        let mut reference = BuildRef::new(
            id,
            self.build_type_id.unwrap_or_default(),
            self.branch_name,
            href,
        );
        reference.status = self.status;
        reference.state = self.state;
        reference
    }
}

/// Locator path of a build by id.
pub fn build_href(id: i64) -> String {
    format!("/app/rest/latest/builds/id:{id}")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildsJson {
    #[serde(default)]
    pub build: Vec<BuildRefJson>,
}

impl BuildsJson {
    pub fn into_refs(self) -> Vec<BuildRef> {
        self.build.into_iter().map(BuildRefJson::into_model).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTypeJson {
    pub id: Option<String>,
    pub name: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJson {
    pub id: Option<i64>,
    pub build_type_id: Option<String>,
    pub number: Option<String>,
    pub status: Option<String>,
    pub state: Option<String>,
    pub branch_name: Option<String>,
    pub href: Option<String>,
    pub web_url: Option<String>,
    #[serde(default)]
    pub composite: bool,
    pub start_date: Option<String>,
    pub finish_date: Option<String>,
    pub build_type: Option<BuildTypeJson>,
    #[serde(rename = "snapshot-dependencies", default)]
    pub snapshot_dependencies: Option<BuildsJson>,
}

impl BuildJson {
    pub fn into_model(self) -> Build {
        let Some(id) = self.id else {
            return Build::fake_stub();
        };

        let build_type = self.build_type;
        let build_type_id = self
            .build_type_id
            .or_else(|| build_type.as_ref().and_then(|bt| bt.id.clone()))
            .unwrap_or_default();

        Build {
            id,
            build_type_name: build_type
                .as_ref()
                .and_then(|bt| bt.name.clone())
                .unwrap_or_else(|| build_type_id.clone()),
            project_id: build_type
                .and_then(|bt| bt.project_id)
                .unwrap_or_default(),
            build_type_id,
            branch_name: self.branch_name,
            number: self.number,
            status: self.status,
            state: self.state,
            href: self.href.unwrap_or_else(|| build_href(id)),
            web_url: self.web_url,
            composite: self.composite,
            snapshot_dependencies: self
                .snapshot_dependencies
                .map(BuildsJson::into_refs)
                .unwrap_or_default(),
            start_date: self.start_date.as_deref().and_then(parse_teamcity_date),
            finish_date: self.finish_date.as_deref().and_then(parse_teamcity_date),
            fake_stub: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemOccurrenceJson {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub identity: String,
    #[serde(rename = "type", default)]
    pub problem_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProblemOccurrencesJson {
    #[serde(rename = "problemOccurrence", default)]
    pub problem_occurrence: Vec<ProblemOccurrenceJson>,
}

impl ProblemOccurrencesJson {
    pub fn into_model(self) -> Vec<ProblemOccurrence> {
        self.problem_occurrence
            .into_iter()
            .map(|p| ProblemOccurrence {
                id: p.id,
                identity: p.identity,
                problem_type: p.problem_type,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestRefJson {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOccurrenceJson {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    pub duration: Option<u64>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub currently_investigated: bool,
    pub test: Option<TestRefJson>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestOccurrencesJson {
    #[serde(rename = "testOccurrence", default)]
    pub test_occurrence: Vec<TestOccurrenceJson>,
}

impl TestOccurrencesJson {
    pub fn into_model(self) -> Vec<TestOccurrence> {
        self.test_occurrence
            .into_iter()
            .map(|t| TestOccurrence {
                test_id: t.test.and_then(|test| test.id),
                name: t.name,
                status: t.status,
                duration_ms: t.duration,
                muted: t.muted,
                ignored: t.ignored,
                currently_investigated: t.currently_investigated,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeJson {
    pub id: Option<i64>,
    pub version: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangesJson {
    #[serde(default)]
    pub change: Vec<ChangeJson>,
}

impl ChangesJson {
    pub fn into_model(self) -> Vec<Change> {
        self.change
            .into_iter()
            .map(|c| match c.id {
                Some(id) => Change::new(id, c.version, c.username),
                None => Change::fake_stub(),
            })
            .collect()
    }
}
