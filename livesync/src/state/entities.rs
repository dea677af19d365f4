//! The five synced record types.
//!
//! Wire names are camelCase. Backends that expose Mongo-style `_id` keys are
//! accepted through an alias; ids are always serialized back as `id`.

#[cfg(test)]
#[path = "entities_test.rs"]
mod entities_test;

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityKind, SortValue};
use super::view::SearchContext;

fn full_name(first: &str, last: &str) -> String {
    format!("{first} {last}").trim().to_owned()
}

fn push_some(fields: &mut Vec<String>, value: Option<&String>) {
    if let Some(value) = value {
        fields.push(value.clone());
    }
}

// =============================================================================
// CONTRACT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub employee_id: String,
    #[serde(default)]
    pub department_id: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub salary: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    /// Display name resolved by the backend, when it sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
}

impl Contract {
    /// Employee display name: the embedded one, else the context index.
    #[must_use]
    pub fn employee_display_name<'a>(&'a self, ctx: &'a SearchContext) -> Option<&'a str> {
        self.employee_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| ctx.employee_name(&self.employee_id))
    }
}

impl Entity for Contract {
    const KIND: EntityKind = EntityKind::Contract;

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self, ctx: &SearchContext) -> Vec<String> {
        let mut fields = vec![self.title.clone(), self.contract_type.clone(), self.status.clone()];
        if let Some(name) = self.employee_display_name(ctx) {
            fields.push(name.to_owned());
        }
        fields
    }

    fn sort_value(&self, key: &str, ctx: &SearchContext) -> SortValue {
        match key {
            "title" => SortValue::text(Some(self.title.as_str())),
            "contractType" | "type" => SortValue::text(Some(self.contract_type.as_str())),
            "status" => SortValue::text(Some(self.status.as_str())),
            "currency" => SortValue::text(Some(self.currency.as_str())),
            "employee" | "employeeName" => SortValue::text(self.employee_display_name(ctx)),
            "salary" => SortValue::number(Some(self.salary)),
            "startDate" => SortValue::timestamp(Some(self.start_date.as_str())),
            "endDate" => SortValue::timestamp(self.end_date.as_deref()),
            _ => SortValue::Missing,
        }
    }
}

// =============================================================================
// EMPLOYEE
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub hire_date: Option<String>,
    #[serde(default)]
    pub salary: Option<f64>,
}

impl Employee {
    #[must_use]
    pub fn display_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

impl Entity for Employee {
    const KIND: EntityKind = EntityKind::Employee;

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self, _ctx: &SearchContext) -> Vec<String> {
        let mut fields = vec![self.display_name(), self.email.clone(), self.status.clone()];
        push_some(&mut fields, self.position.as_ref());
        fields
    }

    fn sort_value(&self, key: &str, _ctx: &SearchContext) -> SortValue {
        match key {
            "name" => SortValue::text(Some(self.display_name().as_str())),
            "firstName" => SortValue::text(Some(self.first_name.as_str())),
            "lastName" => SortValue::text(Some(self.last_name.as_str())),
            "email" => SortValue::text(Some(self.email.as_str())),
            "position" => SortValue::text(self.position.as_deref()),
            "status" => SortValue::text(Some(self.status.as_str())),
            "salary" => SortValue::number(self.salary),
            "hireDate" => SortValue::timestamp(self.hire_date.as_deref()),
            _ => SortValue::Missing,
        }
    }
}

// =============================================================================
// DEPARTMENT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub head_id: Option<String>,
    #[serde(default)]
    pub employee_count: u32,
}

impl Entity for Department {
    const KIND: EntityKind = EntityKind::Department;

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self, _ctx: &SearchContext) -> Vec<String> {
        let mut fields = vec![self.name.clone()];
        push_some(&mut fields, self.code.as_ref());
        push_some(&mut fields, self.description.as_ref());
        fields
    }

    fn sort_value(&self, key: &str, _ctx: &SearchContext) -> SortValue {
        match key {
            "name" => SortValue::text(Some(self.name.as_str())),
            "code" => SortValue::text(self.code.as_deref()),
            "employeeCount" => SortValue::number(Some(f64::from(self.employee_count))),
            _ => SortValue::Missing,
        }
    }
}

// =============================================================================
// JOB
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employment_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_max: Option<f64>,
    #[serde(default)]
    pub applicant_count: u32,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
}

impl Entity for Job {
    const KIND: EntityKind = EntityKind::Job;

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self, _ctx: &SearchContext) -> Vec<String> {
        let mut fields = vec![self.title.clone(), self.employment_type.clone(), self.status.clone()];
        push_some(&mut fields, self.location.as_ref());
        fields
    }

    fn sort_value(&self, key: &str, _ctx: &SearchContext) -> SortValue {
        match key {
            "title" => SortValue::text(Some(self.title.as_str())),
            "location" => SortValue::text(self.location.as_deref()),
            "employmentType" => SortValue::text(Some(self.employment_type.as_str())),
            "status" => SortValue::text(Some(self.status.as_str())),
            "salaryMin" => SortValue::number(self.salary_min),
            "salaryMax" => SortValue::number(self.salary_max),
            "applicantCount" | "applicants" => SortValue::number(Some(f64::from(self.applicant_count))),
            "postedAt" => SortValue::timestamp(self.posted_at.as_deref()),
            "deadline" => SortValue::timestamp(self.deadline.as_deref()),
            _ => SortValue::Missing,
        }
    }
}

// =============================================================================
// APPLICANT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub applied_at: Option<String>,
}

impl Applicant {
    #[must_use]
    pub fn display_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

impl Entity for Applicant {
    const KIND: EntityKind = EntityKind::Applicant;

    fn id(&self) -> &str {
        &self.id
    }

    fn search_fields(&self, _ctx: &SearchContext) -> Vec<String> {
        let mut fields = vec![self.display_name(), self.email.clone(), self.status.clone()];
        push_some(&mut fields, self.phone.as_ref());
        fields
    }

    fn sort_value(&self, key: &str, _ctx: &SearchContext) -> SortValue {
        match key {
            "name" => SortValue::text(Some(self.display_name().as_str())),
            "email" => SortValue::text(Some(self.email.as_str())),
            "status" => SortValue::text(Some(self.status.as_str())),
            "appliedAt" => SortValue::timestamp(self.applied_at.as_deref()),
            _ => SortValue::Missing,
        }
    }
}
