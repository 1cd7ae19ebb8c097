// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub const SCHEMA_SQL: &str = r#"
-- Namespace and Database
DEFINE NAMESPACE stockflow;
USE NS stockflow;
DEFINE DATABASE core;
USE DB core;

-- Table: user
DEFINE TABLE OVERWRITE user SCHEMAFULL;
DEFINE FIELD OVERWRITE email ON user TYPE string
    ASSERT string::len($value) > 0 AND string::len($value) <= 255;
DEFINE FIELD OVERWRITE password_hash ON user TYPE string;
DEFINE FIELD OVERWRITE created_at ON user TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE updated_at ON user TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE unique_user_email ON user FIELDS email UNIQUE;

-- Table: portfolio (one per user)
DEFINE TABLE OVERWRITE portfolio SCHEMAFULL;
DEFINE FIELD OVERWRITE user_id ON portfolio TYPE string;
DEFINE FIELD OVERWRITE created_at ON portfolio TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE updated_at ON portfolio TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE unique_portfolio_user ON portfolio FIELDS user_id UNIQUE;

-- Table: stock_position
DEFINE TABLE OVERWRITE stock_position SCHEMAFULL;
DEFINE FIELD OVERWRITE portfolio_id ON stock_position TYPE string;
DEFINE FIELD OVERWRITE ticker ON stock_position TYPE string
    ASSERT string::len($value) >= 1 AND string::len($value) <= 13;
DEFINE FIELD OVERWRITE quantity ON stock_position TYPE float ASSERT $value > 0;
DEFINE FIELD OVERWRITE purchase_price ON stock_position TYPE float ASSERT $value > 0;
-- Stored as ISO date string; validated before insert
DEFINE FIELD OVERWRITE purchase_date ON stock_position TYPE string;
DEFINE FIELD OVERWRITE created_at ON stock_position TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE updated_at ON stock_position TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE position_portfolio_idx ON stock_position FIELDS portfolio_id;
-- One position per ticker within a portfolio
DEFINE INDEX OVERWRITE unique_position_ticker ON stock_position FIELDS portfolio_id, ticker UNIQUE;

-- Table: price_alert
DEFINE TABLE OVERWRITE price_alert SCHEMAFULL;
DEFINE FIELD OVERWRITE user_id ON price_alert TYPE string;
DEFINE FIELD OVERWRITE ticker ON price_alert TYPE string
    ASSERT string::len($value) >= 1 AND string::len($value) <= 13;
DEFINE FIELD OVERWRITE condition ON price_alert TYPE string ASSERT $value IN ['above', 'below'];
DEFINE FIELD OVERWRITE target_price ON price_alert TYPE float ASSERT $value > 0;
DEFINE FIELD OVERWRITE notification_channels ON price_alert TYPE array<string>
    ASSERT array::len($value) > 0;
DEFINE FIELD OVERWRITE is_active ON price_alert TYPE bool DEFAULT true;
DEFINE FIELD OVERWRITE created_at ON price_alert TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE triggered_at ON price_alert TYPE option<datetime>;
DEFINE INDEX OVERWRITE alert_user_idx ON price_alert FIELDS user_id;
DEFINE INDEX OVERWRITE alert_ticker_idx ON price_alert FIELDS ticker;
DEFINE INDEX OVERWRITE alert_active_idx ON price_alert FIELDS is_active;

-- Table: notification
-- Append-only except for the read flag
DEFINE TABLE OVERWRITE notification SCHEMAFULL;
DEFINE FIELD OVERWRITE user_id ON notification TYPE string;
DEFINE FIELD OVERWRITE type ON notification TYPE string
    ASSERT string::len($value) >= 1 AND string::len($value) <= 50;
DEFINE FIELD OVERWRITE title ON notification TYPE string
    ASSERT string::len($value) >= 1 AND string::len($value) <= 255;
DEFINE FIELD OVERWRITE message ON notification TYPE string;
-- Structured payload stored as JSON string to bypass SCHEMAFULL
-- nested-object filtering
DEFINE FIELD OVERWRITE data ON notification TYPE string DEFAULT '{}';
DEFINE FIELD OVERWRITE is_read ON notification TYPE bool DEFAULT false;
DEFINE FIELD OVERWRITE created_at ON notification TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE notification_user_idx ON notification FIELDS user_id;
DEFINE INDEX OVERWRITE notification_read_idx ON notification FIELDS user_id, is_read;

-- Table: workflow
-- The definition graph is immutable after creation
DEFINE TABLE OVERWRITE workflow SCHEMAFULL;
DEFINE FIELD OVERWRITE user_id ON workflow TYPE string;
DEFINE FIELD OVERWRITE name ON workflow TYPE string
    ASSERT string::len($value) > 0 AND string::len($value) <= 256;
DEFINE FIELD OVERWRITE workflow_type ON workflow TYPE string;
-- Node/edge graph stored as JSON string (SCHEMAFULL nested-object workaround)
DEFINE FIELD OVERWRITE definition ON workflow TYPE string;
DEFINE FIELD OVERWRITE execution_mode ON workflow TYPE string
    ASSERT $value IN ['sequential', 'parallel'];
DEFINE FIELD OVERWRITE schedule ON workflow TYPE option<string>;
DEFINE FIELD OVERWRITE is_active ON workflow TYPE bool DEFAULT true;
DEFINE FIELD OVERWRITE created_at ON workflow TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE updated_at ON workflow TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE workflow_user_idx ON workflow FIELDS user_id;
DEFINE INDEX OVERWRITE workflow_active_idx ON workflow FIELDS is_active;

-- Table: workflow_execution
-- Written by the engine only; terminal once completed or failed
DEFINE TABLE OVERWRITE workflow_execution SCHEMAFULL;
DEFINE FIELD OVERWRITE workflow_id ON workflow_execution TYPE string;
DEFINE FIELD OVERWRITE status ON workflow_execution TYPE string DEFAULT 'pending'
    ASSERT $value IN ['pending', 'running', 'completed', 'failed'];
DEFINE FIELD OVERWRITE progress ON workflow_execution TYPE int DEFAULT 0
    ASSERT $value >= 0 AND $value <= 100;
DEFINE FIELD OVERWRITE current_node ON workflow_execution TYPE option<string>;
-- Results and errors stored as JSON strings (SCHEMAFULL nested-object workaround)
DEFINE FIELD OVERWRITE results ON workflow_execution TYPE option<string>;
DEFINE FIELD OVERWRITE errors ON workflow_execution TYPE string DEFAULT '[]';
DEFINE FIELD OVERWRITE execution_time_ms ON workflow_execution TYPE option<int>;
DEFINE FIELD OVERWRITE started_at ON workflow_execution TYPE option<datetime>;
DEFINE FIELD OVERWRITE completed_at ON workflow_execution TYPE option<datetime>;
DEFINE FIELD OVERWRITE created_at ON workflow_execution TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE execution_workflow_idx ON workflow_execution FIELDS workflow_id;
DEFINE INDEX OVERWRITE execution_status_idx ON workflow_execution FIELDS status;

-- Table: audit_log (append-only)
DEFINE TABLE OVERWRITE audit_log SCHEMAFULL;
DEFINE FIELD OVERWRITE user_id ON audit_log TYPE option<string>;
DEFINE FIELD OVERWRITE action ON audit_log TYPE string
    ASSERT string::len($value) >= 1 AND string::len($value) <= 100;
DEFINE FIELD OVERWRITE resource_type ON audit_log TYPE string
    ASSERT string::len($value) >= 1 AND string::len($value) <= 50;
DEFINE FIELD OVERWRITE resource_id ON audit_log TYPE option<string>;
DEFINE FIELD OVERWRITE details ON audit_log TYPE string DEFAULT '{}';
DEFINE FIELD OVERWRITE created_at ON audit_log TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE audit_user_idx ON audit_log FIELDS user_id;
DEFINE INDEX OVERWRITE audit_action_idx ON audit_log FIELDS action;

-- Table: policy_acceptance
DEFINE TABLE OVERWRITE policy_acceptance SCHEMAFULL;
DEFINE FIELD OVERWRITE user_id ON policy_acceptance TYPE string;
DEFINE FIELD OVERWRITE policy_type ON policy_acceptance TYPE string
    ASSERT $value IN ['privacy_policy', 'terms_of_service'];
DEFINE FIELD OVERWRITE policy_version ON policy_acceptance TYPE string;
DEFINE FIELD OVERWRITE accepted_at ON policy_acceptance TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE policy_user_idx ON policy_acceptance FIELDS user_id;

-- Table: data_deletion_request
DEFINE TABLE OVERWRITE data_deletion_request SCHEMAFULL;
DEFINE FIELD OVERWRITE user_id ON data_deletion_request TYPE option<string>;
-- Email kept so the request survives user deletion
DEFINE FIELD OVERWRITE user_email ON data_deletion_request TYPE string;
DEFINE FIELD OVERWRITE requested_at ON data_deletion_request TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE scheduled_deletion_date ON data_deletion_request TYPE datetime;
DEFINE FIELD OVERWRITE status ON data_deletion_request TYPE string DEFAULT 'pending'
    ASSERT $value IN ['pending', 'completed', 'cancelled'];
DEFINE FIELD OVERWRITE completed_at ON data_deletion_request TYPE option<datetime>;
DEFINE INDEX OVERWRITE deletion_status_idx ON data_deletion_request FIELDS status;
"#;
